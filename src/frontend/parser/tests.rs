use hashbrown::HashMap;
use indoc::indoc;

use super::{ParseOutput, ParserConfig, parse};
use crate::{
    frontend::SourceFile,
    middle::{
        ir::{BuiltIn, ExecutionModel, Id, Op, Operand, builder::ShortCircuit},
        ty::Qualifiers,
    },
};

fn parse_with(source: &str, config: ParserConfig) -> ParseOutput {
    parse(&SourceFile::from_memory(source), config)
}

fn parse_ok(source: &str) -> ParseOutput {
    let output = parse_with(source, ParserConfig::default());

    assert!(
        output.success,
        "expected no errors, got:\n{}",
        output.diagnostics
    );

    output
}

/// Parses a source expected to fail with an error containing `fragment`
fn parse_err(source: &str, fragment: &str) -> ParseOutput {
    let output = parse_with(source, ParserConfig::default());

    assert!(!output.success, "expected errors for:\n{source}");
    assert!(
        output.diagnostics.errors().any(|d| d.message.contains(fragment)),
        "expected an error containing '{fragment}', got:\n{}",
        output.diagnostics
    );

    output
}

fn body_ops(output: &ParseOutput) -> Vec<Op> {
    output.module.body_instructions().map(|i| i.op).collect()
}

#[test]
fn uniform_offsets_follow_block_layout() {
    let output = parse_ok(indoc! {"
        uniform float3 direction;
        uniform float intensity;
        uniform float4 color;
        uniform float4x4 transform;
    "});

    let offsets = output
        .effect
        .uniforms
        .iter()
        .map(|u| (u.name.as_str(), u.offset, u.size))
        .collect::<Vec<_>>();

    assert_eq!(
        offsets,
        [
            ("direction", 0, 16),
            ("intensity", 16, 4),
            ("color", 32, 16),
            ("transform", 48, 64),
        ]
    );
}

#[test]
fn implicit_uniforms_are_reported() {
    let output = parse_ok("float scale = 2.0;");

    assert!(output.diagnostics.warnings().any(|d| d.code == 5000));

    let uniform = output.effect.uniform("scale");
    assert!(uniform.is_some_and(|u| u.initializer.is_some()));
}

#[test]
fn constants_fold_into_array_sizes() {
    let output = parse_ok(indoc! {"
        static const int BASE = 6 / 3 + 1;
        uniform float weights[BASE * 2];
    "});

    let uniform = output.effect.uniform("weights");
    assert_eq!(uniform.map(|u| u.ty.array_length), Some(6));
    assert_eq!(uniform.map(|u| u.size), Some(6 * 16));
}

#[test]
fn integer_division_by_zero_warns() {
    let output = parse_ok("static const int BROKEN = 1 / 0;");

    assert!(output.diagnostics.warnings().any(|d| d.code == 4008));
}

#[test]
fn mixed_swizzle_sets_are_rejected() {
    parse_err(
        indoc! {"
            float4 main() : SV_Target
            {
                float4 value = 1.0;
                return value.xgba;
            }
        "},
        "mixed swizzle sets",
    );
}

#[test]
fn long_swizzles_are_rejected() {
    parse_err(
        indoc! {"
            float4 main() : SV_Target
            {
                float4 value = 1.0;
                return value.xyzwx;
            }
        "},
        "swizzle too long",
    );
}

#[test]
fn break_outside_of_loop() {
    let output = parse_err("void main() { break; }", "break must be inside loop");

    assert!(output.diagnostics.errors().all(|d| d.code == 3518));
}

#[test]
fn recursion_is_rejected() {
    let output = parse_err(
        indoc! {"
            int fact(int n)
            {
                return n <= 1 ? 1 : n * fact(n - 1);
            }
        "},
        "recursive function calls are not allowed",
    );

    assert!(output.diagnostics.errors().any(|d| d.code == 3500));
}

#[test]
fn redefinitions_are_rejected() {
    parse_err(
        indoc! {"
            static float value;
            static float value;
        "},
        "redefinition of 'value'",
    );

    parse_err(
        indoc! {"
            void helper() {}
            void helper() {}
        "},
        "redefinition of 'helper'",
    );
}

#[test]
fn overloads_differing_in_parameters_are_allowed() {
    let output = parse_ok(indoc! {"
        float twice(float x) { return x * 2.0; }
        int twice(int x) { return x * 2; }

        float use_both() { return twice(1.0) + twice(2); }
    "});

    assert_eq!(output.functions.len(), 3);
    assert!(body_ops(&output).contains(&Op::FunctionCall));
}

#[test]
fn missing_return_value() {
    parse_err(
        "float value(bool flag) { if (flag) return 1.0; }",
        "function must return a value",
    );
}

#[test]
fn struct_members_carry_semantics() {
    let output = parse_ok(indoc! {"
        struct VSOutput
        {
            float4 position : SV_Position;
            float2 uv : TEXCOORD0;
            float3 normal : NORMAL;
        };

        float2 get_uv(VSOutput value)
        {
            return value.uv;
        }
    "});

    let members = &output.structs[0].members;

    assert_eq!(members[0].builtin, Some(BuiltIn::Position));
    assert_eq!(members[1].semantic, "TEXCOORD0");
    assert_eq!(members[1].builtin, None);
    assert_eq!(members[1].semantic_index, 0);
    // Semantics without an index are assigned locations from 10 upwards
    assert_eq!(members[2].semantic_index, 10);
}

#[test]
fn unknown_struct_member() {
    parse_err(
        indoc! {"
            struct Light { float3 color; };

            float3 get(Light light) { return light.position; }
        "},
        "invalid subscript 'position'",
    );
}

#[test]
fn logical_operators_branch_when_requested() {
    let source = "bool both(bool a, bool b) { return a && b; }";

    let branching = parse_with(
        source,
        ParserConfig {
            short_circuit: ShortCircuit::Branch,
        },
    );
    assert!(branching.success);
    assert!(body_ops(&branching).contains(&Op::Phi));

    let output = parse_ok(source);
    assert!(!body_ops(&output).contains(&Op::Phi));
    assert!(body_ops(&output).contains(&Op::LogicalAnd));
}

#[test]
fn matrix_vector_multiplication_swaps_operands() {
    let output = parse_ok(indoc! {"
        float4 transform(float4x4 m, float4 v)
        {
            return mul(m, v);
        }
    "});

    assert!(body_ops(&output).contains(&Op::VectorTimesMatrix));
}

#[test]
fn loops_emit_merge_instructions() {
    let output = parse_ok(indoc! {"
        int sum(int count)
        {
            int total = 0;

            [unroll]
            for (int i = 0; i < count; i++)
            {
                if (i == 3)
                    continue;

                total += i;
            }

            while (total > 100)
                total -= 10;

            return total;
        }
    "});

    let ops = body_ops(&output);

    assert_eq!(ops.iter().filter(|op| **op == Op::LoopMerge).count(), 2);
    assert!(ops.contains(&Op::SelectionMerge));
}

#[test]
fn switch_with_fallthrough() {
    let output = parse_ok(indoc! {"
        int pick(int x)
        {
            int result = 0;

            switch (x)
            {
            case 1:
                result = 10;
            case 2:
                result += 1;
                break;
            default:
                result = -1;
                break;
            }

            return result;
        }
    "});

    assert!(body_ops(&output).contains(&Op::Switch));
}

#[test]
fn textures_samplers_and_techniques() {
    let output = parse_ok(indoc! {"
        texture2D colorTex { Width = 64; Height = 32; Format = RGBA16F; };
        sampler2D colorSampler { Texture = colorTex; MinFilter = POINT; AddressU = CLAMP; };

        struct VSOutput
        {
            float4 position : SV_Position;
            float2 uv : TEXCOORD0;
        };

        VSOutput MainVS(uint id : SV_VertexID)
        {
            VSOutput output;
            output.uv = float2(0.0, 1.0);
            output.position = float4(0.0, 0.0, 0.0, 1.0);
            return output;
        }

        float4 MainPS(VSOutput input) : SV_Target
        {
            return tex2D(colorSampler, input.uv);
        }

        technique Example < ui_label = \"Example\"; >
        {
            pass First
            {
                VertexShader = MainVS;
                PixelShader = MainPS;
                RenderTarget = colorTex;
                BlendEnable = true;
                SrcBlend = SRCALPHA;
                DestBlend = INVSRCALPHA;
            }
        }
    "});

    let texture = &output.effect.textures[0];
    assert_eq!((texture.width, texture.height, texture.format), (64, 32, 10));

    let sampler = &output.effect.samplers[0];
    assert_eq!(sampler.texture_name, "colorTex");
    assert_eq!(sampler.address_u, 3);
    assert_eq!(sampler.filter, 0x05);

    let technique = &output.effect.techniques[0];
    assert_eq!(technique.name, "Example");
    assert!(technique.annotations.contains_key("ui_label"));

    let pass = &technique.passes[0];
    assert_eq!(pass.name, "First");
    assert!(pass.blend_enable);
    assert_eq!((pass.src_blend, pass.dest_blend), (3, 5));
    assert_eq!(pass.render_targets[0].as_deref(), Some("colorTex"));
    assert_eq!(pass.vertex_shader.is_some(), pass.pixel_shader.is_some());

    let entry_points = output
        .module
        .entry_points
        .iter()
        .map(|e| (e.name.as_str(), e.model))
        .collect::<Vec<_>>();

    assert_eq!(
        entry_points,
        [
            ("MainVS", ExecutionModel::Vertex),
            ("MainPS", ExecutionModel::Fragment)
        ]
    );
}

#[test]
fn entry_points_are_created_once_per_stage() {
    let output = parse_ok(indoc! {"
        float4 MainPS() : SV_Target { return 1.0; }

        technique First { pass { PixelShader = MainPS; } }
        technique Second { pass { PixelShader = MainPS; } }
    "});

    assert_eq!(output.module.entry_points.len(), 1);
    assert_eq!(
        output.effect.techniques[0].passes[0].pixel_shader,
        output.effect.techniques[1].passes[0].pixel_shader
    );
}

#[test]
fn sampler_without_texture() {
    parse_err(
        "sampler2D lonely { MinFilter = LINEAR; };",
        "missing 'Texture' property for 'lonely'",
    );
}

#[test]
fn unknown_pass_state() {
    parse_err(
        indoc! {"
            technique Broken
            {
                pass
                {
                    Wobble = 1;
                }
            }
        "},
        "unrecognized pass state 'Wobble'",
    );
}

#[test]
fn errors_in_one_function_do_not_hide_the_next() {
    let output = parse_with(
        indoc! {"
            void first() { missing_a = 1; }
            void second() { missing_b = 2; }
        "},
        ParserConfig::default(),
    );

    let undeclared = output
        .diagnostics
        .errors()
        .filter(|d| d.code == 3004)
        .count();

    assert_eq!(undeclared, 2);
    assert!(
        output
            .diagnostics
            .to_string()
            .contains("error X3004: undeclared identifier 'missing_a'")
    );
}

#[test]
fn assignment_to_constant() {
    parse_err(
        indoc! {"
            void main()
            {
                const float fixed = 1.0;
                fixed = 2.0;
            }
        "},
        "l-value specifies const object",
    );
}

#[test]
fn constant_arithmetic_emits_no_instructions() {
    let output = parse_ok("int seven() { return 1 + 2 * 3; }");

    let ops = body_ops(&output);
    assert!(!ops.contains(&Op::IAdd));
    assert!(!ops.contains(&Op::IMul));

    let returned = output
        .module
        .body_instructions()
        .find(|i| i.op == Op::ReturnValue)
        .and_then(|i| i.referenced_ids().next());

    let constant = returned.and_then(|id| output.module.declaration_of(id));
    assert_eq!(constant.map(|c| c.op), Some(Op::Constant));
    assert_eq!(
        constant.and_then(|c| c.operands.first()),
        Some(&Operand::LiteralBit32(7))
    );
}

#[test]
fn repeated_swizzles_are_not_assignable() {
    parse_err(
        indoc! {"
            void main()
            {
                float2 v = 0.0;
                v.xx = float2(1.0, 2.0);
            }
        "},
        "l-value specifies const object",
    );
}

#[test]
fn swizzle_components_must_be_in_range() {
    parse_err(
        indoc! {"
            float4 widen(float2 v)
            {
                return v.xyzw;
            }
        "},
        "swizzle out of range",
    );
}

#[test]
fn infinite_loop_with_break() {
    let output = parse_ok(indoc! {"
        void main()
        {
            for (;;)
            {
                break;
            }
        }
    "});

    assert!(body_ops(&output).contains(&Op::LoopMerge));
    assert!(body_ops(&output).contains(&Op::Return));
}

#[test]
fn void_function_returning_a_value() {
    parse_err(
        "void main() { return 1; }",
        "void functions cannot return a value",
    );
}

#[test]
fn member_access_yields_declared_type() {
    let output = parse_ok(indoc! {"
        struct Vertex
        {
            float3 pos : POSITION;
            float2 uv : TEXCOORD0;
        };

        float2 get(Vertex v) { return v.uv; }
    "});

    let uv = output.structs[0].member("uv").map(|(index, member)| (index, member.ty));

    assert_eq!(uv.map(|(index, _)| index), Some(1));
    assert!(uv.is_some_and(|(_, ty)| ty.is_floating_point() && ty.rows == 2 && ty.cols == 1));
    assert!(body_ops(&output).contains(&Op::AccessChain));
}

#[test]
fn declarations_follow_their_dependencies() {
    let output = parse_ok(indoc! {"
        texture2D sourceTex { Width = 32; Height = 32; };
        sampler2D sourceSampler { Texture = sourceTex; };

        uniform float exposure = 1.5;

        struct VSOut
        {
            float4 position : SV_Position;
            float2 uv : TEXCOORD0;
        };

        VSOut vs(uint id : SV_VertexID)
        {
            VSOut o;
            o.uv = float2(id == 2 ? 2.0 : 0.0, id == 1 ? 2.0 : 0.0);
            o.position = float4(o.uv * float2(2.0, -2.0) + float2(-1.0, 1.0), 0.0, 1.0);
            return o;
        }

        float4 ps(VSOut i) : SV_Target
        {
            return tex2D(sourceSampler, i.uv) * exposure;
        }

        technique Blit { pass { VertexShader = vs; PixelShader = ps; } }
    "});

    let declarations = &output.module.declarations.instructions;
    let positions = declarations
        .iter()
        .enumerate()
        .filter_map(|(position, i)| i.result.map(|id| (id, position)))
        .collect::<HashMap<Id, usize>>();

    for (position, instruction) in declarations.iter().enumerate() {
        for id in instruction.ty.into_iter().chain(instruction.referenced_ids()) {
            if let Some(&declared_at) = positions.get(&id) {
                assert!(
                    declared_at < position,
                    "{id} is used by {:?} before it is declared",
                    instruction.op
                );
            }
        }
    }
}

#[test]
fn index_must_be_an_integral_scalar() {
    parse_err(
        indoc! {"
            float pick(float i)
            {
                float values[3] = { 1.0, 2.0, 3.0 };
                return values[i];
            }
        "},
        "index must be a scalar",
    );

    parse_ok(indoc! {"
        float pick(int i)
        {
            float values[3] = { 1.0, 2.0, 3.0 };
            return values[i];
        }
    "});
}

#[test]
fn equally_ranked_overloads_are_ambiguous() {
    let output = parse_err(
        indoc! {"
            void take(uint a) {}
            void take(float a) {}
            void main() { take(1); }
        "},
        "ambiguous function call to 'take'",
    );

    assert!(output.diagnostics.errors().all(|d| d.code == 3067));
}

#[test]
fn unconvertible_arguments_match_no_overload() {
    let output = parse_err(
        indoc! {"
            void take(float2 a) {}
            void main() { float3x3 m; take(m); }
        "},
        "no matching function overload for 'take'",
    );

    assert!(output.diagnostics.errors().all(|d| d.code == 3013));
}

#[test]
fn parenthesized_constructor_is_not_a_cast() {
    let output = parse_ok(indoc! {"
        float2 constructed() { return (float2(1.0, 2.0)); }
        float narrowed(float4 v) { return (float)v; }
    "});

    let ops = body_ops(&output);
    assert!(ops.contains(&Op::CompositeExtract));
    assert!(!ops.contains(&Op::CompositeConstruct));
}

#[test]
fn out_arguments_are_copied_back_after_the_call() {
    let output = parse_ok(indoc! {"
        void twice(inout float value) { value = value * 2.0; }
        void reset(out float value) { value = 0.0; }

        float main()
        {
            float2 v = float2(1.0, 2.0);
            twice(v.x);
            reset(v.y);
            return v.x;
        }
    "});

    let ops = body_ops(&output);
    let calls = ops
        .iter()
        .enumerate()
        .filter(|(_, op)| **op == Op::FunctionCall)
        .map(|(position, _)| position)
        .collect::<Vec<_>>();

    assert_eq!(calls.len(), 2);

    for call in calls {
        let after = &ops[call + 1..];
        let load = after.iter().position(|op| *op == Op::Load);
        let store = after.iter().position(|op| *op == Op::Store);

        assert!(
            matches!((load, store), (Some(load), Some(store)) if load < store),
            "expected a copy back after the call, got {after:?}"
        );
    }
}

#[test]
fn double_literals_are_truncated() {
    let output = parse_ok("float halve() { return 0.5l; }");

    assert!(output.diagnostics.warnings().any(|d| {
        d.code == 5000 && d.message == "double literal truncated to float literal"
    }));
}

#[test]
fn integer_interpolation_modes_are_rejected() {
    for source in [
        "void main(centroid int x : TEXCOORD0) {}",
        "void main(noperspective uint2 x : TEXCOORD0) {}",
    ] {
        let output = parse_err(source, "invalid interpolation mode");
        assert!(output.diagnostics.errors().all(|d| d.code == 4576));
    }

    parse_ok("void main(nointerpolation int x : TEXCOORD0) {}");
}

#[test]
fn centroid_implies_linear() {
    let output = parse_ok(indoc! {"
        float4 smooth(centroid float2 uv : TEXCOORD0) : SV_Target { return uv.xyxy; }
        float4 flat(centroid noperspective float2 uv : TEXCOORD0) : SV_Target { return uv.xyxy; }
    "});

    let parameter_type = |name: &str| {
        output
            .functions
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.parameters[0].ty)
            .unwrap_or_else(|| panic!("function '{name}' was not recorded"))
    };

    assert!(parameter_type("smooth").has(Qualifiers::LINEAR));
    assert!(!parameter_type("flat").has(Qualifiers::LINEAR));
}

#[test]
fn array_dimensions_are_bounded() {
    for size in [0, 65537] {
        parse_err(
            &format!("void main() {{ float values[{size}]; }}"),
            "array dimension must be between 1 and 65536",
        );
    }

    parse_ok("void main() { float values[65536]; }");
}

#[test]
fn failures_are_reported_once() {
    for source in [
        "void f(int a) { switch (a) { case 0: continue; } }",
        "centroid int x;",
    ] {
        let output = parse_with(source, ParserConfig::default());

        assert!(!output.success);
        assert_eq!(
            output.diagnostics.errors().count(),
            1,
            "expected a single error for '{source}', got:\n{}",
            output.diagnostics
        );
    }
}

use luapre::errors::ErrorCategory;
use luapre::runtime::MetaRuntime;
use luapre::syntax::lex;
use luapre::transpiler::{has_preprocessor_code, transpile, TranspileOptions};
use luapre::{ErrorKind, LuapreError, SourceContext};

fn transpile_with(source: &str, options: TranspileOptions) -> Result<String, LuapreError> {
    let tokens = lex(source, "test.lua2p")?;
    let runtime = MetaRuntime::new();
    let ctx = SourceContext::from_file("test.lua2p", source);
    transpile(&tokens, &ctx, &options, &runtime)
}

fn transpile_src(source: &str) -> Result<String, LuapreError> {
    transpile_with(source, TranspileOptions::default())
}

// ---
// Verbatim chunks
// ---

#[test]
fn plain_source_becomes_one_output_call() {
    let metaprogram = transpile_src("print(\"hi\")\n").expect("transpile should succeed");
    assert_eq!(metaprogram, "outputLua(\"print(\\\"hi\\\")\\\n\")");
}

#[test]
fn debug_mode_emits_readable_fragments() {
    let metaprogram = transpile_with(
        "x\n",
        TranspileOptions {
            add_line_numbers: false,
            debug: true,
        },
    )
    .expect("transpile should succeed");
    assert_eq!(metaprogram, "outputLua(\"x\\n\")\n");
}

#[test]
fn empty_input_produces_empty_metaprogram() {
    assert_eq!(transpile_src("").expect("transpile should succeed"), "");
}

// ---
// Meta lines
// ---

#[test]
fn meta_line_text_passes_through() {
    let metaprogram = transpile_src("! foo()\n").expect("transpile should succeed");
    assert_eq!(metaprogram, " foo()\n");
}

#[test]
fn meta_lines_wrap_verbatim_body() {
    let metaprogram =
        transpile_src("!for i=1,3 do\n    x()\n!end\n").expect("transpile should succeed");
    assert_eq!(
        metaprogram,
        "for i=1,3 do\noutputLua(\"    x()\\\n\")end\n"
    );
}

#[test]
fn short_comment_ends_a_meta_line() {
    let metaprogram =
        transpile_src("!local a = 1 -- note\nprint(a)\n").expect("transpile should succeed");
    assert_eq!(
        metaprogram,
        "local a = 1 -- note\noutputLua(\"\\\nprint(a)\\\n\")"
    );
}

#[test]
fn meta_line_requires_start_of_line() {
    let err = transpile_src("local a = !x\n").expect_err("should fail");
    assert_eq!(err.kind, ErrorKind::UnexpectedPreprocessor);
    assert_eq!(err.kind.category(), ErrorCategory::Structural);
}

#[test]
fn double_sigil_without_paren_is_an_error() {
    let err = transpile_src("!!x\n").expect_err("should fail");
    assert_eq!(err.kind, ErrorKind::UnexpectedPreprocessor);
}

#[test]
fn sigil_inside_meta_line_is_an_error() {
    let err = transpile_src("!local a = !(1)\n").expect_err("should fail");
    assert_eq!(err.kind, ErrorKind::PreprocessorInsideMeta);
}

// ---
// Meta blocks
// ---

#[test]
fn inline_expression_becomes_output_value() {
    let metaprogram = transpile_src("local n = !(1+2)\n").expect("transpile should succeed");
    assert_eq!(
        metaprogram,
        "outputLua(\"local n = \")outputValue(1+2)\noutputLua(\"\\\n\")"
    );
}

#[test]
fn statement_block_passes_through() {
    let metaprogram = transpile_src("!(local x = 1)\n").expect("transpile should succeed");
    assert_eq!(metaprogram, "local x = 1\noutputLua(\"\\\n\")");
}

#[test]
fn double_block_becomes_output_lua() {
    let metaprogram = transpile_src("!!(\"foo\"..1) = 5\n").expect("transpile should succeed");
    assert_eq!(
        metaprogram,
        "outputLua(\"foo\"..1)\noutputLua(\" = 5\\\n\")"
    );
}

#[test]
fn empty_block_emits_nothing() {
    let metaprogram = transpile_src("!()\n").expect("transpile should succeed");
    assert_eq!(metaprogram, "\noutputLua(\"\\\n\")");
}

#[test]
fn block_parentheses_balance_across_lines() {
    let metaprogram =
        transpile_src("!(f(\n  g(1),\n  2\n))\n").expect("transpile should succeed");
    assert_eq!(
        metaprogram,
        "outputValue(f(\n  g(1),\n  2\n))\noutputLua(\"\\\n\")"
    );
}

#[test]
fn invalid_double_block_expression_is_an_error() {
    let err = transpile_src("local x = !!(1+)").expect_err("should fail");
    assert_eq!(err.kind, ErrorKind::InvalidMetaExpression);
    assert_eq!(err.kind.category(), ErrorCategory::Semantic);
    // Localized at the sigil on line 1 of the named source.
    assert_eq!(err.source_info.source.name(), "test.lua2p");
    assert_eq!(err.source_info.primary_span.offset(), 10);
    assert_eq!(err.source_info.phase, "parser");
}

#[test]
fn unbalanced_block_is_an_error() {
    let err = transpile_src("!(f(").expect_err("should fail");
    assert_eq!(err.kind, ErrorKind::UnbalancedMetaBlock);
}

#[test]
fn sigil_inside_block_is_an_error() {
    let err = transpile_src("!(f(!x))").expect_err("should fail");
    assert_eq!(err.kind, ErrorKind::PreprocessorInsideMeta);
}

// ---
// Line annotations
// ---

#[test]
fn annotations_appear_only_on_line_changes() {
    let metaprogram = transpile_with(
        "a()\nb()\n",
        TranspileOptions {
            add_line_numbers: true,
            debug: false,
        },
    )
    .expect("transpile should succeed");
    assert!(metaprogram.contains("--[[@1]]a()"));
    assert!(metaprogram.contains("--[[@2]]b()"));
    assert_eq!(metaprogram.matches("--[[@").count(), 2);
}

// ---
// Misc
// ---

#[test]
fn preprocessor_presence_is_detected() {
    let with = lex("local n = !(1)\n", "t").expect("lex should succeed");
    let without = lex("local n = 1\n", "t").expect("lex should succeed");
    assert!(has_preprocessor_code(&with));
    assert!(!has_preprocessor_code(&without));
}

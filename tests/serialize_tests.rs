use mlua::{Lua, Value};

use luapre::serialize::{quote_lua_string, serialize, SerializeError};

fn eval<'lua>(lua: &'lua Lua, expr: &str) -> Value<'lua> {
    lua.load(format!("return {}", expr))
        .eval()
        .expect("test expression should evaluate")
}

fn roundtrips(lua: &Lua, expr: &str) -> String {
    let serialized = serialize(&eval(lua, expr)).expect("serialize should succeed");
    // The serialized form must evaluate back and serialize to the same
    // text, which also pins determinism.
    let again = serialize(&eval(lua, &serialized)).expect("re-serialize should succeed");
    assert_eq!(serialized, again, "not a fixed point for {expr}");
    serialized
}

// ---
// Scalars
// ---

#[test]
fn nil_and_booleans() {
    let lua = Lua::new();
    assert_eq!(roundtrips(&lua, "nil"), "nil");
    assert_eq!(roundtrips(&lua, "true"), "true");
    assert_eq!(roundtrips(&lua, "false"), "false");
}

#[test]
fn plain_numbers() {
    let lua = Lua::new();
    assert_eq!(roundtrips(&lua, "3"), "3");
    assert_eq!(roundtrips(&lua, "0.5"), "0.5");
    assert_eq!(serialize(&Value::Number(1e300)).unwrap(), "1e300");
}

#[test]
fn special_numbers() {
    assert_eq!(serialize(&Value::Number(f64::INFINITY)).unwrap(), "math.huge");
    assert_eq!(
        serialize(&Value::Number(f64::NEG_INFINITY)).unwrap(),
        " -math.huge"
    );
    assert_eq!(serialize(&Value::Number(f64::NAN)).unwrap(), "0/0");
    // Negative zero loses its sign.
    assert_eq!(serialize(&Value::Number(-0.0)).unwrap(), "0");
    assert_eq!(serialize(&Value::Integer(0)).unwrap(), "0");
}

#[test]
fn negative_numbers_get_a_guarding_space() {
    assert_eq!(serialize(&Value::Integer(-5)).unwrap(), " -5");
    assert_eq!(serialize(&Value::Number(-2.5)).unwrap(), " -2.5");
}

#[test]
fn strings_escape_and_stay_on_one_line() {
    let lua = Lua::new();
    assert_eq!(roundtrips(&lua, "\"plain\""), "\"plain\"");
    assert_eq!(roundtrips(&lua, "\"a\\nb\""), "\"a\\nb\"");
    assert_eq!(roundtrips(&lua, "\"q\\\"q\""), "\"q\\\"q\"");
    assert_eq!(roundtrips(&lua, "\"tab\\there\""), "\"tab\\there\"");
    let serialized = roundtrips(&lua, "\"back\\\\slash\"");
    assert_eq!(serialized, "\"back\\\\slash\"");
}

// ---
// Tables
// ---

#[test]
fn array_part_comes_first() {
    let lua = Lua::new();
    assert_eq!(roundtrips(&lua, "{1,2,3}"), "{1,2,3}");
    assert_eq!(roundtrips(&lua, "{}"), "{}");
}

#[test]
fn hash_part_sorts_by_key_string() {
    let lua = Lua::new();
    assert_eq!(roundtrips(&lua, "{c=3,a=1,b=2}"), "{a=1,b=2,c=3}");
    assert_eq!(roundtrips(&lua, "{1,2,b=2,a=1}"), "{1,2,a=1,b=2}");
}

#[test]
fn non_identifier_keys_are_bracketed() {
    let lua = Lua::new();
    assert_eq!(roundtrips(&lua, "{[\"x y\"]=1}"), "{[\"x y\"]=1}");
    assert_eq!(roundtrips(&lua, "{[10]=true}"), "{[10]=true}");
    assert_eq!(roundtrips(&lua, "{[true]=1}"), "{[true]=1}");
}

#[test]
fn tables_nest() {
    let lua = Lua::new();
    assert_eq!(
        roundtrips(&lua, "{list={1,2},name=\"n\"}"),
        "{list={1,2},name=\"n\"}"
    );
}

// ---
// Errors
// ---

#[test]
fn functions_cannot_be_serialized() {
    let lua = Lua::new();
    let err = serialize(&eval(&lua, "function() end")).expect_err("should fail");
    assert_eq!(err, SerializeError::Unsupported("function"));
    assert_eq!(
        err.to_string(),
        "Cannot serialize value of type 'function'."
    );
}

#[test]
fn table_keys_cannot_be_tables() {
    let lua = Lua::new();
    let err = serialize(&eval(&lua, "{[{}]=1}")).expect_err("should fail");
    assert_eq!(err, SerializeError::TableKey);
    assert_eq!(err.to_string(), "Table keys cannot be tables.");
}

// ---
// The shared quoter
// ---

#[test]
fn quoter_modes_differ_only_in_line_breaks() {
    assert_eq!(quote_lua_string("a\nb", true), "\"a\\nb\"");
    assert_eq!(quote_lua_string("a\nb", false), "\"a\\\nb\"");
    assert_eq!(quote_lua_string("say \"hi\"", true), "\"say \\\"hi\\\"\"");
}

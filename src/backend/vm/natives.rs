//! The minimal native library (§6): `clock`, `sqrt`, `pow`, `atof`, wired
//! into the runtime `globals` table as immutable bindings at VM startup.
//! `NATIVE_NAMES` is also consulted by the compiler (`GlobalDeclTable::new`)
//! so these names are known-immutable at compile time, matching how every
//! other global's mutability is tracked (§3 Compiler state).

use std::sync::OnceLock;
use std::time::Instant;

use crate::common::object::{NativeArgType, obj_ref};
use crate::common::value::Value;

pub const NATIVE_NAMES: &[&str] = &["clock", "sqrt", "pow", "atof"];

fn process_start() -> &'static Instant {
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now)
}

fn native_clock(_args: &[Value]) -> Result<Value, String> {
    Ok(Value::Number(process_start().elapsed().as_secs_f64()))
}

fn native_sqrt(args: &[Value]) -> Result<Value, String> {
    let x = args[0].as_number().expect("arity/type checked by the caller");
    Ok(Value::Number(x.sqrt()))
}

fn native_pow(args: &[Value]) -> Result<Value, String> {
    let base = args[0].as_number().expect("arity/type checked by the caller");
    let exp = args[1].as_number().expect("arity/type checked by the caller");
    Ok(Value::Number(base.powf(exp)))
}

fn native_atof(args: &[Value]) -> Result<Value, String> {
    let ptr = args[0].as_obj().expect("arity/type checked by the caller");
    let text = &unsafe { obj_ref(ptr) }.as_string().data;
    text.trim().parse::<f64>().map(Value::Number).map_err(|_| format!("atof(): '{}' is not a number", text))
}

/// One table row: name, declared arity, per-argument type constraint, and
/// the function pointer itself (§3 Heap objects: Native payload).
pub struct NativeSpec {
    pub name: &'static str,
    pub arity: u8,
    pub arg_types: Vec<NativeArgType>,
    pub function: crate::common::object::NativeFn,
}

pub fn specs() -> Vec<NativeSpec> {
    vec![
        NativeSpec { name: "clock", arity: 0, arg_types: vec![], function: native_clock },
        NativeSpec {
            name: "sqrt",
            arity: 1,
            arg_types: vec![NativeArgType::Number],
            function: native_sqrt,
        },
        NativeSpec {
            name: "pow",
            arity: 2,
            arg_types: vec![NativeArgType::Number, NativeArgType::Number],
            function: native_pow,
        },
        NativeSpec {
            name: "atof",
            arity: 1,
            arg_types: vec![NativeArgType::String],
            function: native_atof,
        },
    ]
}

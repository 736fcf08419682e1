//! Signatures of the standard library modules.
//!
//! The assembly implementations live in `<stdlib>/<module>.asm` and are pulled
//! in with `%include`; only the signatures are needed for call resolution.

use super::FunctionSig;
use crate::ast::Type;

/// Names of every standard library module.
pub const LIBRARIES: &[&str] = &["io", "time", "random", "convert", "intMath"];

const INTEGER_TYPES: [(&str, Type); 4] = [
    ("i8", Type::I8),
    ("i16", Type::I16),
    ("i32", Type::I32),
    ("i64", Type::I64),
];

fn sig(name: &str, params: Vec<Type>, return_type: Option<Type>) -> FunctionSig {
    FunctionSig {
        name: name.to_string(),
        params,
        return_type,
    }
}

/// Functions exported by a library module, or `None` if it does not exist.
pub fn library_functions(name: &str) -> Option<Vec<FunctionSig>> {
    let functions = match name {
        "io" => vec![
            sig("printChar", vec![Type::Char], None),
            sig("printI32", vec![Type::I32], None),
            sig("printI8", vec![Type::I8], None),
            sig("printI16", vec![Type::I16], None),
            sig("printI64", vec![Type::I64], None),
            sig("printPointer", vec![Type::pointer_to(Type::Any)], None),
        ],
        "time" => vec![sig("getUnixTime", vec![], Some(Type::I32))],
        "random" => vec![sig("randomI32", vec![Type::I32], Some(Type::I32))],
        "convert" => {
            let mut functions = Vec::new();
            for (from_name, from) in INTEGER_TYPES.iter() {
                for (to_name, to) in INTEGER_TYPES.iter() {
                    if from_name != to_name {
                        functions.push(sig(
                            &format!("{}to{}", from_name, to_name),
                            vec![from.clone()],
                            Some(to.clone()),
                        ));
                    }
                }
                functions.push(sig(
                    &format!("{}tochar", from_name),
                    vec![from.clone()],
                    Some(Type::Char),
                ));
            }
            functions
        }
        "intMath" => vec![
            sig("min", vec![Type::I32, Type::I32], Some(Type::I32)),
            sig("max", vec![Type::I32, Type::I32], Some(Type::I32)),
        ],
        _ => return None,
    };
    Some(functions)
}

// Sample programs. The front end is not part of this crate, so every sample is the typed tree
// a type checker would hand over for a small Cube program. They are compiled by the
// end-to-end tests and by `cubec`, and each carries the output the program prints when the
// resulting assembly runs against the `io` library: integers are printed followed by a
// newline, characters are printed as-is and `puts` appends a newline.

//! Built-in sample programs.

use crate::ast::{
    BinaryOp, CompareOp, ExprArena, ExprId, FunctionDef, ImportTarget, Param, Stmt, StructDef,
    Type, Unit,
};

/// A complete program: one or more units, compiled together.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub name: &'static str,
    pub description: &'static str,
    /// What the program prints, `main`'s unit last in [`Sample::units`].
    pub expected_output: &'static str,
    build: fn() -> Vec<Unit>,
}

impl Sample {
    /// Build fresh typed units for this program.
    pub fn units(&self) -> Vec<Unit> {
        (self.build)()
    }
}

const SAMPLES: &[Sample] = &[
    Sample {
        name: "fibonacci",
        description: "recursive fib(30)",
        expected_output: "832040\n",
        build: fibonacci,
    },
    Sample {
        name: "for-loop-sum",
        description: "sum of 1..=10 in a for loop",
        expected_output: "55\n",
        build: for_loop_sum,
    },
    Sample {
        name: "pointer-deref",
        description: "write through a pointer and read it back",
        expected_output: "10\n10\n",
        build: pointer_deref,
    },
    Sample {
        name: "struct-fields",
        description: "struct fields, directly and through a pointer",
        expected_output: "42\n3\n7\n",
        build: struct_fields,
    },
    Sample {
        name: "struct-copy",
        description: "whole-struct assignment, directly and through a pointer",
        expected_output: "1\n2\nA",
        build: struct_copy,
    },
    Sample {
        name: "array-2d",
        description: "two-dimensional array with literal and computed indices",
        expected_output: "7\n20\n",
        build: array_2d,
    },
    Sample {
        name: "array-to-pointer",
        description: "arrays passed where a pointer is expected",
        expected_output: "15\n15\n",
        build: array_to_pointer,
    },
    Sample {
        name: "euclidean",
        description: "greatest common divisor with division and multiplication",
        expected_output: "21\n",
        build: euclidean,
    },
    Sample {
        name: "string-printing",
        description: "a string literal passed to an extern function",
        expected_output: "Hello, World!\n",
        build: string_printing,
    },
    Sample {
        name: "stack-arguments",
        description: "a call with more arguments than argument registers",
        expected_output: "36\n",
        build: stack_arguments,
    },
    Sample {
        name: "register-pressure",
        description: "an expression needing more registers than the pool has",
        expected_output: "36\n",
        build: register_pressure,
    },
    Sample {
        name: "multiple-files",
        description: "a function imported from a second unit",
        expected_output: "144\n",
        build: multiple_files,
    },
];

/// Every sample, in listing order.
pub fn all() -> &'static [Sample] {
    SAMPLES
}

pub fn find(name: &str) -> Option<&'static Sample> {
    SAMPLES.iter().find(|sample| sample.name == name)
}

// Tree helpers.

fn function(name: &str, params: Vec<Param>, return_type: Option<Type>, body: Vec<Stmt>) -> Stmt {
    Stmt::Function(FunctionDef {
        name: name.to_string(),
        params,
        return_type,
        body,
        pos: None,
    })
}

fn main_function(arena: &mut ExprArena, mut body: Vec<Stmt>) -> Stmt {
    let zero = arena.int(0);
    body.push(Stmt::Return(Some(zero)));
    function("main", Vec::new(), Some(Type::I32), body)
}

fn declare(name: &str, ty: Type, value: Option<ExprId>) -> Stmt {
    Stmt::VarInit {
        name: name.to_string(),
        ty,
        value,
        pos: None,
    }
}

fn import(library: &str) -> Stmt {
    Stmt::Import {
        target: ImportTarget::Library(library.to_string()),
        pos: None,
    }
}

fn set(arena: &mut ExprArena, target: ExprId, value: ExprId) -> Stmt {
    Stmt::Expression(arena.assign(target, value))
}

fn print_i32(arena: &mut ExprArena, value: ExprId) -> Stmt {
    Stmt::Expression(arena.call("printI32", vec![value], Type::None))
}

fn point() -> Type {
    Type::Struct("Point".to_string())
}

fn point_struct() -> Stmt {
    Stmt::Struct(StructDef {
        name: "Point".to_string(),
        fields: vec![Param::new("x", Type::I32), Param::new("y", Type::I32)],
        pos: None,
    })
}

/// `for (var i: i32 = from; i < limit; i = i + 1) body`
fn count_up(arena: &mut ExprArena, from: i64, limit: ExprId, body: Vec<Stmt>) -> Stmt {
    let start = arena.int(from);
    let i = arena.var("i", Type::I32);
    let cond = arena.compare(i, CompareOp::Lt, limit);
    let i_target = arena.var("i", Type::I32);
    let i_value = arena.var("i", Type::I32);
    let one = arena.int(1);
    let next = arena.binary(i_value, BinaryOp::Add, one);
    let step = set(arena, i_target, next);
    Stmt::For {
        init: Box::new(declare("i", Type::I32, Some(start))),
        cond,
        step: Box::new(step),
        body: Box::new(Stmt::Block(body)),
    }
}

fn fib_of_n_minus(a: &mut ExprArena, by: i64) -> ExprId {
    let n = a.var("n", Type::I32);
    let by = a.int(by);
    let arg = a.binary(n, BinaryOp::Sub, by);
    a.call("fib", vec![arg], Type::I32)
}

fn int_field(a: &mut ExprArena, var: &str, ty: Type, name: &str) -> ExprId {
    let base = a.var(var, ty);
    a.field(base, name, Type::I32)
}

fn triple_field(a: &mut ExprArena, var: &str, name: &str, ty: Type) -> ExprId {
    let base = a.var(var, Type::Struct("Triple".to_string()));
    a.field(base, name, ty)
}

/// `grid[row][column]` on an `i32[4][3]`.
fn grid_cell(a: &mut ExprArena, row: ExprId, column: ExprId) -> ExprId {
    let base = a.var("grid", Type::array_of(Type::array_of(Type::I32, 4), 3));
    let row = a.index(base, row);
    a.index(row, column)
}

// Programs.

fn fibonacci() -> Vec<Unit> {
    let mut unit = Unit::new("fibonacci");
    let a = &mut unit.arena;

    let n = a.var("n", Type::I32);
    let two = a.int(2);
    let small = a.compare(n, CompareOp::Lt, two);
    let n_result = a.var("n", Type::I32);

    let left = fib_of_n_minus(a, 1);
    let right = fib_of_n_minus(a, 2);
    let sum = a.binary(left, BinaryOp::Add, right);

    let thirty = a.int(30);
    let fib30 = a.call("fib", vec![thirty], Type::I32);
    let print = print_i32(a, fib30);
    let main = main_function(a, vec![print]);

    unit.statements = vec![
        import("io"),
        function(
            "fib",
            vec![Param::new("n", Type::I32)],
            Some(Type::I32),
            vec![
                Stmt::If {
                    cond: small,
                    then: Box::new(Stmt::Block(vec![Stmt::Return(Some(n_result))])),
                    else_: None,
                },
                Stmt::Return(Some(sum)),
            ],
        ),
        main,
    ];
    vec![unit]
}

fn for_loop_sum() -> Vec<Unit> {
    let mut unit = Unit::new("forLoopSum");
    let a = &mut unit.arena;

    let zero = a.int(0);
    let sum_target = a.var("sum", Type::I32);
    let sum_value = a.var("sum", Type::I32);
    let i = a.var("i", Type::I32);
    let added = a.binary(sum_value, BinaryOp::Add, i);
    let accumulate = set(a, sum_target, added);
    let eleven = a.int(11);
    let for_loop = count_up(a, 1, eleven, vec![accumulate]);
    let sum = a.var("sum", Type::I32);
    let print = print_i32(a, sum);
    let main = main_function(a, vec![declare("sum", Type::I32, Some(zero)), for_loop, print]);

    unit.statements = vec![import("io"), main];
    vec![unit]
}

fn pointer_deref() -> Vec<Unit> {
    let mut unit = Unit::new("pointerDereference");
    let a = &mut unit.arena;
    let int_ptr = Type::pointer_to(Type::I32);

    let five = a.int(5);
    let x = a.var("x", Type::I32);
    let address = a.address_of(x);
    let p = a.var("p", int_ptr.clone());
    let target = a.deref(p);
    let ten = a.int(10);
    let write = set(a, target, ten);
    let x_value = a.var("x", Type::I32);
    let print_x = print_i32(a, x_value);
    let p_value = a.var("p", int_ptr.clone());
    let read = a.deref(p_value);
    let print_deref = print_i32(a, read);

    let main = main_function(
        a,
        vec![
            declare("x", Type::I32, Some(five)),
            declare("p", int_ptr, Some(address)),
            write,
            print_x,
            print_deref,
        ],
    );
    unit.statements = vec![import("io"), main];
    vec![unit]
}

fn struct_fields() -> Vec<Unit> {
    let mut unit = Unit::new("structFields");
    let a = &mut unit.arena;
    let point_ptr = Type::pointer_to(point());

    let px = int_field(a, "p", point(), "x");
    let three = a.int(3);
    let set_x = set(a, px, three);
    let py = int_field(a, "p", point(), "y");
    let forty_two = a.int(42);
    let set_y = set(a, py, forty_two);

    let p = a.var("p", point());
    let address = a.address_of(p);

    let py = int_field(a, "p", point(), "y");
    let print_y = print_i32(a, py);
    let qx = int_field(a, "q", point_ptr.clone(), "x");
    let print_qx = print_i32(a, qx);
    let qy = int_field(a, "q", point_ptr.clone(), "y");
    let seven = a.int(7);
    let set_qy = set(a, qy, seven);
    let py = int_field(a, "p", point(), "y");
    let print_py = print_i32(a, py);

    let main = main_function(
        a,
        vec![
            declare("p", point(), None),
            set_x,
            set_y,
            declare("q", point_ptr, Some(address)),
            print_y,
            print_qx,
            set_qy,
            print_py,
        ],
    );
    unit.statements = vec![import("io"), point_struct(), main];
    vec![unit]
}

fn struct_copy() -> Vec<Unit> {
    let mut unit = Unit::new("structCopy");
    let a = &mut unit.arena;
    let triple = Type::Struct("Triple".to_string());
    let triple_ptr = Type::pointer_to(triple.clone());

    let ax = triple_field(a, "a", "x", Type::I32);
    let one = a.int(1);
    let set_x = set(a, ax, one);
    let ay = triple_field(a, "a", "y", Type::I32);
    let two = a.int(2);
    let set_y = set(a, ay, two);
    let atag = triple_field(a, "a", "tag", Type::Char);
    let letter = a.char_literal(b'A');
    let set_tag = set(a, atag, letter);

    let whole = a.var("a", triple.clone());
    let a_ref = a.var("a", triple.clone());
    let address = a.address_of(a_ref);
    let q = a.var("q", triple_ptr.clone());
    let through = a.deref(q);

    let bx = triple_field(a, "b", "x", Type::I32);
    let print_bx = print_i32(a, bx);
    let cy = triple_field(a, "c", "y", Type::I32);
    let print_cy = print_i32(a, cy);
    let ctag = triple_field(a, "c", "tag", Type::Char);
    let print_tag = Stmt::Expression(a.call("printChar", vec![ctag], Type::None));

    let main = main_function(
        a,
        vec![
            declare("a", triple.clone(), None),
            set_x,
            set_y,
            set_tag,
            declare("b", triple.clone(), Some(whole)),
            declare("q", triple_ptr, Some(address)),
            declare("c", triple, Some(through)),
            print_bx,
            print_cy,
            print_tag,
        ],
    );
    unit.statements = vec![
        import("io"),
        Stmt::Struct(StructDef {
            name: "Triple".to_string(),
            fields: vec![
                Param::new("x", Type::I32),
                Param::new("y", Type::I32),
                Param::new("tag", Type::Char),
            ],
            pos: None,
        }),
        main,
    ];
    vec![unit]
}

fn array_2d() -> Vec<Unit> {
    let mut unit = Unit::new("array2d");
    let a = &mut unit.arena;
    let grid = Type::array_of(Type::array_of(Type::I32, 4), 3);

    let one = a.int(1);
    let two = a.int(2);
    let target = grid_cell(a, one, two);
    let seven = a.int(7);
    let set_literal = set(a, target, seven);

    let row = a.var("i", Type::I32);
    let column = a.var("i", Type::I32);
    let diagonal = grid_cell(a, row, column);
    let i = a.var("i", Type::I32);
    let ten = a.int(10);
    let scaled = a.binary(i, BinaryOp::Mul, ten);
    let set_diagonal = set(a, diagonal, scaled);
    let three = a.int(3);
    let fill = count_up(a, 0, three, vec![set_diagonal]);

    let one = a.int(1);
    let two = a.int(2);
    let read = grid_cell(a, one, two);
    let print_literal = print_i32(a, read);
    let two = a.int(2);
    let also_two = a.int(2);
    let read = grid_cell(a, two, also_two);
    let print_diagonal = print_i32(a, read);

    let main = main_function(
        a,
        vec![
            declare("grid", grid, None),
            set_literal,
            fill,
            print_literal,
            print_diagonal,
        ],
    );
    unit.statements = vec![import("io"), main];
    vec![unit]
}

fn array_to_pointer() -> Vec<Unit> {
    let mut unit = Unit::new("arrayToPointer");
    let a = &mut unit.arena;
    let int_ptr = Type::pointer_to(Type::I32);
    let values = Type::array_of(Type::I32, 5);

    // fn sum(p: i32*, n: i32): i32
    let zero = a.int(0);
    let total_target = a.var("total", Type::I32);
    let total_value = a.var("total", Type::I32);
    let p = a.var("p", int_ptr.clone());
    let i = a.var("i", Type::I32);
    let element = a.index(p, i);
    let added = a.binary(total_value, BinaryOp::Add, element);
    let accumulate = set(a, total_target, added);
    let n = a.var("n", Type::I32);
    let walk = count_up(a, 0, n, vec![accumulate]);
    let total = a.var("total", Type::I32);
    let sum = function(
        "sum",
        vec![Param::new("p", int_ptr.clone()), Param::new("n", Type::I32)],
        Some(Type::I32),
        vec![
            declare("total", Type::I32, Some(zero)),
            walk,
            Stmt::Return(Some(total)),
        ],
    );

    // values[i] = i + 1
    let base = a.var("values", values.clone());
    let i = a.var("i", Type::I32);
    let slot = a.index(base, i);
    let i = a.var("i", Type::I32);
    let one = a.int(1);
    let next = a.binary(i, BinaryOp::Add, one);
    let store = set(a, slot, next);
    let five = a.int(5);
    let fill = count_up(a, 0, five, vec![store]);

    let decayed = a.var("values", values.clone());
    let five = a.int(5);
    let implicit = a.call("sum", vec![decayed, five], Type::I32);
    let print_implicit = print_i32(a, implicit);

    let base = a.var("values", values.clone());
    let zero = a.int(0);
    let first = a.index(base, zero);
    let explicit_ptr = a.address_of(first);
    let five = a.int(5);
    let explicit = a.call("sum", vec![explicit_ptr, five], Type::I32);
    let print_explicit = print_i32(a, explicit);

    let main = main_function(
        a,
        vec![
            declare("values", values, None),
            fill,
            print_implicit,
            print_explicit,
        ],
    );
    unit.statements = vec![import("io"), sum, main];
    vec![unit]
}

fn euclidean() -> Vec<Unit> {
    let mut unit = Unit::new("euclidean");
    let a = &mut unit.arena;

    // while (b != 0) { var t: i32 = b; b = a - (a / b) * b; a = t; }
    let b = a.var("b", Type::I32);
    let zero = a.int(0);
    let running = a.compare(b, CompareOp::Ne, zero);
    let b_value = a.var("b", Type::I32);
    let keep = declare("t", Type::I32, Some(b_value));
    let dividend = a.var("a", Type::I32);
    let divisor = a.var("b", Type::I32);
    let quotient = a.binary(dividend, BinaryOp::Div, divisor);
    let quotient = a.grouping(quotient);
    let b_again = a.var("b", Type::I32);
    let product = a.binary(quotient, BinaryOp::Mul, b_again);
    let product = a.grouping(product);
    let a_value = a.var("a", Type::I32);
    let remainder = a.binary(a_value, BinaryOp::Sub, product);
    let b_target = a.var("b", Type::I32);
    let set_b = set(a, b_target, remainder);
    let a_target = a.var("a", Type::I32);
    let t = a.var("t", Type::I32);
    let set_a = set(a, a_target, t);
    let result = a.var("a", Type::I32);

    let gcd = function(
        "gcd",
        vec![Param::new("a", Type::I32), Param::new("b", Type::I32)],
        Some(Type::I32),
        vec![
            Stmt::While {
                cond: running,
                body: Box::new(Stmt::Block(vec![keep, set_b, set_a])),
            },
            Stmt::Return(Some(result)),
        ],
    );

    let left = a.int(1071);
    let right = a.int(462);
    let call = a.call("gcd", vec![left, right], Type::I32);
    let print = print_i32(a, call);
    let main = main_function(a, vec![print]);

    unit.statements = vec![import("io"), gcd, main];
    vec![unit]
}

fn string_printing() -> Vec<Unit> {
    let mut unit = Unit::new("stringPrinting");
    let a = &mut unit.arena;

    let text = a.string("Hello, World!");
    let call = a.call("puts", vec![text], Type::I32);
    let main = main_function(a, vec![Stmt::Expression(call)]);

    unit.statements = vec![
        Stmt::ExternFunction {
            name: "puts".to_string(),
            params: vec![Param::new("text", Type::pointer_to(Type::Char))],
            return_type: Some(Type::I32),
        },
        main,
    ];
    vec![unit]
}

const SUM_PARAMS: [&str; 8] = ["a", "b", "c", "d", "e", "f", "g", "h"];

fn stack_arguments() -> Vec<Unit> {
    let mut unit = Unit::new("stackArguments");
    let a = &mut unit.arena;

    let mut sum = a.var(SUM_PARAMS[0], Type::I32);
    for name in &SUM_PARAMS[1..] {
        let next = a.var(name, Type::I32);
        sum = a.binary(sum, BinaryOp::Add, next);
    }
    let sum8 = function(
        "sum8",
        SUM_PARAMS
            .iter()
            .map(|name| Param::new(name, Type::I32))
            .collect(),
        Some(Type::I32),
        vec![Stmt::Return(Some(sum))],
    );

    let args: Vec<ExprId> = (1..=8).map(|value| a.int(value)).collect();
    let call = a.call("sum8", args, Type::I32);
    let print = print_i32(a, call);
    let main = main_function(a, vec![print]);

    unit.statements = vec![import("io"), sum8, main];
    vec![unit]
}

fn register_pressure() -> Vec<Unit> {
    let mut unit = Unit::new("registerPressure");
    let a = &mut unit.arena;

    let mut body = Vec::new();
    for (value, name) in (1..).zip(SUM_PARAMS) {
        let init = a.int(value);
        body.push(declare(name, Type::I32, Some(init)));
    }

    // a + (b + (c + ... (g + h)))
    let mut nested = a.var(SUM_PARAMS[7], Type::I32);
    for name in SUM_PARAMS[..7].iter().rev() {
        let left = a.var(name, Type::I32);
        let inner = a.grouping(nested);
        nested = a.binary(left, BinaryOp::Add, inner);
    }
    body.push(print_i32(a, nested));
    let main = main_function(a, body);

    unit.statements = vec![import("io"), main];
    vec![unit]
}

fn multiple_files() -> Vec<Unit> {
    let mut helper = Unit::new("square");
    let h = &mut helper.arena;
    let x = h.var("x", Type::I32);
    let x_again = h.var("x", Type::I32);
    let product = h.binary(x, BinaryOp::Mul, x_again);
    helper.statements = vec![function(
        "square",
        vec![Param::new("x", Type::I32)],
        Some(Type::I32),
        vec![Stmt::Return(Some(product))],
    )];

    let mut unit = Unit::new("multipleFiles");
    let a = &mut unit.arena;
    let twelve = a.int(12);
    let call = a.call("square", vec![twelve], Type::I32);
    let print = print_i32(a, call);
    let main = main_function(a, vec![print]);
    unit.statements = vec![
        Stmt::Import {
            target: ImportTarget::File("square".to_string()),
            pos: None,
        },
        import("io"),
        main,
    ];

    vec![helper, unit]
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashSet;

    #[test]
    fn test_sample_names_are_unique() {
        let names: HashSet<&str> = all().iter().map(|sample| sample.name).collect();
        assert_eq!(names.len(), all().len());
    }

    #[test]
    fn test_find_by_name() {
        assert_eq!(find("fibonacci").map(|s| s.expected_output), Some("832040\n"));
        assert!(find("missing").is_none());
    }

    #[test]
    fn test_main_unit_comes_last() {
        for sample in all() {
            let units = sample.units();
            let last = units.last().expect("sample without units");
            assert!(last.defines_main(), "{} has no main in its last unit", sample.name);
        }
    }
}

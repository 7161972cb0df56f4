mod common;

use common::{code_of, compile_source};
use jmmc::codegen::opcodes::*;
use jmmc::codegen::{Code, Instruction, Label};

fn switch_default(code: &Code) -> Label {
    code.instructions
        .iter()
        .find_map(|(_, i)| match i {
            Instruction::TableSwitch { default, .. } | Instruction::LookupSwitch { default, .. } => Some(*default),
            _ => None,
        })
        .expect("no switch instruction")
}

#[test]
fn sparse_switch_uses_lookupswitch() {
    let classes = compile_source(
        r#"
class T {
    static int m(int x) {
        int r = 0;
        switch (x) {
            case 1: r = 10; break;
            case 5: r = 50; break;
        }
        return r;
    }
}
"#,
    );
    let code = code_of(&classes, "T", "m");
    assert_eq!(code.count(LOOKUPSWITCH), 1);
    assert_eq!(code.count(TABLESWITCH), 0);
}

#[test]
fn dense_switch_uses_tableswitch() {
    let classes = compile_source(
        r#"
class T {
    static int m(int x) {
        int r = 0;
        switch (x) {
            case 1: r = 10; break;
            case 2: r = 20; break;
            case 3: r = 30; break;
            case 4: r = 40; break;
            case 5: r = 50; break;
            default: r = -1;
        }
        return r;
    }
}
"#,
    );
    let code = code_of(&classes, "T", "m");
    assert_eq!(code.count(TABLESWITCH), 1);
    let Some((offset, Instruction::TableSwitch { lo, hi, targets, .. })) = code
        .instructions
        .iter()
        .find(|(_, i)| matches!(i, Instruction::TableSwitch { .. }))
    else {
        panic!("no tableswitch");
    };
    assert_eq!((*lo, *hi, targets.len()), (1, 5, 5));
    // Operands start on a 4-byte boundary
    let next = code
        .instructions
        .iter()
        .find(|(o, _)| o > offset)
        .map(|(o, _)| *o)
        .expect("instruction after switch");
    let padding = 3 - (offset % 4);
    assert_eq!(next - offset, 1 + padding + 12 + 4 * 5);
}

#[test]
fn fallthrough_and_break() {
    let classes = compile_source(
        r#"
class T {
    static int m(int x) {
        int r = 0;
        switch (x) {
            case 1:
                r = 1;
            case 2:
                r = r * 2;
                break;
            default:
                r = 9;
        }
        return r;
    }
}
"#,
    );
    let code = code_of(&classes, "T", "m");
    // Only the group ending in `break` jumps to the end
    assert_eq!(code.count(GOTO), 1);

    let default_offset = code.label_offset(switch_default(code));
    let goto_index = code
        .instructions
        .iter()
        .position(|(_, i)| i.opcode() == GOTO)
        .expect("goto");
    let (_, Instruction::Branch { target, .. }) = &code.instructions[goto_index] else {
        panic!("goto is a branch");
    };
    // Nothing follows the break inside its group
    assert_eq!(code.instructions[goto_index + 1].0, default_offset);
    // The break lands after the default group, on the return sequence
    let end = code.label_offset(*target);
    let (_, after_switch) = code
        .instructions
        .iter()
        .find(|(o, _)| *o == end)
        .expect("instruction at the end label");
    assert_eq!(after_switch.opcode(), ILOAD_1);
}

#[test]
fn two_catch_clauses_share_one_range() {
    let classes = compile_source(
        r#"
class T {
    static void f() { }
    static int m() {
        int r = 0;
        try {
            f();
        } catch (RuntimeException e) {
            r = 1;
        } catch (Exception e) {
            r = 2;
        }
        return r;
    }
}
"#,
    );
    let code = code_of(&classes, "T", "m");
    assert_eq!(code.exception_table.len(), 2);
    let (first, second) = (&code.exception_table[0], &code.exception_table[1]);
    assert_eq!((first.start_pc, first.end_pc), (second.start_pc, second.end_pc));
    assert!(first.start_pc < first.end_pc);
    assert_ne!(first.handler_pc, second.handler_pc);
    assert_eq!(first.catch_type.as_deref(), Some("java/lang/RuntimeException"));
    assert_eq!(second.catch_type.as_deref(), Some("java/lang/Exception"));
}

#[test]
fn finally_runs_on_normal_and_exceptional_exit() {
    let classes = compile_source(
        r#"
class T {
    static int m(int x) {
        try {
            x = x * 2;
        } finally {
            x = 0;
        }
        return x;
    }
}
"#,
    );
    let code = code_of(&classes, "T", "m");
    // One inlined copy plus the copy in the catch-any handler
    assert_eq!(code.count(ICONST_0), 2);
    assert_eq!(code.count(ATHROW), 1);
    assert_eq!(code.exception_table.len(), 1);
    let entry = &code.exception_table[0];
    assert_eq!(entry.catch_type, None);
    assert!(entry.handler_pc >= entry.end_pc);
}

#[test]
fn while_condition_branches_directly() {
    let classes = compile_source(
        r#"
class T {
    static int m(int a, int b) {
        while (a < b) {
            a++;
        }
        return a;
    }
}
"#,
    );
    let code = code_of(&classes, "T", "m");
    assert_eq!(code.count(IF_ICMPGE), 1);
    assert_eq!(code.count(ICONST_0), 0);
    assert_eq!(code.count(ICONST_1), 0);
    assert_eq!(code.count(IINC), 1);
}

#[test]
fn short_circuit_conditions_do_not_materialize_booleans() {
    let classes = compile_source(
        r#"
class T {
    static int m(int a, int b) {
        if (a > 0 && (b > 0 || !(a == b))) {
            return 1;
        }
        return 2;
    }
}
"#,
    );
    let code = code_of(&classes, "T", "m");
    assert_eq!(code.count(ICONST_0), 0);
    assert_eq!(code.count(ICONST_1), 1);
    assert_eq!(code.count(IAND) + code.count(IOR), 0);
}

#[test]
fn constructors_run_field_initializers_after_super() {
    let classes = compile_source(
        r#"
class T {
    int size = 4;
    static String name = "t";
    T() { }
    T(int size) { this(); this.size = size; }
}
"#,
    );
    let class = &classes[0];
    assert!(class.field("size").is_some());
    assert_eq!(class.field("name").map(|f| f.descriptor.as_str()), Some("Ljava/lang/String;"));

    let init = code_of(&classes, "T", "<init>");
    let ops = init.opcodes();
    assert_eq!(&ops[..5], &[ALOAD_0, INVOKESPECIAL, ALOAD_0, ICONST_4, PUTFIELD]);
    assert_eq!(ops.last(), Some(&RETURN));

    let clinit = code_of(&classes, "T", "<clinit>");
    assert_eq!(clinit.opcodes(), vec![LDC, PUTSTATIC, RETURN]);

    // The delegating constructor does not repeat the initializers
    let delegating = class
        .methods
        .iter()
        .find(|m| m.name == "<init>" && m.descriptor == "(I)V")
        .and_then(|m| m.code.as_ref())
        .expect("delegating constructor");
    assert_eq!(delegating.count(ICONST_4), 0);
}

#[test]
fn implicit_constructor_calls_object_init() {
    let classes = compile_source("class T { }");
    let class = &classes[0];
    assert_eq!(class.super_name, "java/lang/Object");
    let init = class.method("<init>").expect("implicit constructor");
    assert_eq!(init.descriptor, "()V");
    let code = init.code.as_ref().expect("code");
    assert_eq!(code.opcodes(), vec![ALOAD_0, INVOKESPECIAL, RETURN]);
    assert!(code.listing().contains("invokespecial java/lang/Object.<init>:()V"));
}

#[test]
fn interfaces_have_abstract_methods_only() {
    let classes = compile_source(
        r#"
interface Shape {
    double area();
}

class Square implements Shape {
    double side;
    public double area() { return side * side; }
}
"#,
    );
    let shape = classes.iter().find(|c| c.simple_name() == "Shape").expect("Shape");
    assert!(shape.is_interface());
    assert!(shape.method("area").and_then(|m| m.code.as_ref()).is_none());

    let square = classes.iter().find(|c| c.simple_name() == "Square").expect("Square");
    assert_eq!(square.interfaces, vec!["Shape".to_string()]);
    let area = code_of(&classes, "Square", "area");
    assert_eq!(area.count(DMUL), 1);
    assert_eq!(area.opcodes().last(), Some(&DRETURN));
}

#[test]
fn string_concatenation_uses_string_builder() {
    let classes = compile_source(
        r#"
class T {
    static String m(String s, int n) {
        return s + n + '!';
    }
}
"#,
    );
    let code = code_of(&classes, "T", "m");
    assert_eq!(code.count(NEW), 1);
    let listing = code.listing();
    assert!(listing.contains("new java/lang/StringBuilder"));
    assert!(listing.contains("append:(I)Ljava/lang/StringBuilder;"));
    assert!(listing.contains("append:(C)Ljava/lang/StringBuilder;"));
    assert!(listing.contains("toString:()Ljava/lang/String;"));
}

#[test]
fn packaged_classes_use_internal_names() {
    let classes = compile_source("package a.b; class C { C next; }");
    assert_eq!(classes[0].name, "a/b/C");
    assert_eq!(classes[0].simple_name(), "C");
    assert_eq!(classes[0].field("next").map(|f| f.descriptor.as_str()), Some("La/b/C;"));
}

#[test]
fn class_listing_shape() {
    let classes = compile_source("public class T { private int x; public int get() { return x; } }");
    let listing = classes[0].listing();
    assert!(listing.starts_with(".class public super T\n.super java/lang/Object\n"));
    assert!(listing.contains(".field private x I"));
    assert!(listing.contains(".method public get ()I"));
    assert!(listing.contains(".limit locals 1"));
    assert!(listing.contains("getfield T.x:I"));
    assert!(listing.trim_end().ends_with(".end method"));
}

fn branch_target(code: &Code, index: usize) -> usize {
    match &code.instructions[index].1 {
        Instruction::Branch { target, .. } => code.label_offset(*target),
        other => panic!("expected a branch, got {:?}", other),
    }
}

fn index_of(code: &Code, opcode: u8) -> usize {
    code.instructions
        .iter()
        .position(|(_, i)| i.opcode() == opcode)
        .unwrap_or_else(|| panic!("no opcode {:#x}", opcode))
}

fn iinc_indices(code: &Code, slot: u16, delta: i16) -> Vec<usize> {
    code.instructions
        .iter()
        .enumerate()
        .filter(|(_, (_, i))| *i == Instruction::Iinc { slot, delta })
        .map(|(index, _)| index)
        .collect()
}

#[test]
fn do_while_runs_body_before_test() {
    let classes = compile_source(
        r#"
class T {
    static int m(int x) {
        int n = 0;
        do {
            n++;
            x--;
        } while (x > 0);
        return n;
    }
}
"#,
    );
    let code = code_of(&classes, "T", "m");
    assert_eq!(code.count(GOTO), 0);
    assert_eq!(code.count(IFGT), 1);

    let body = iinc_indices(code, 1, 1)[0];
    let decrement = iinc_indices(code, 0, -1)[0];
    let test = index_of(code, IFGT);
    assert!(body < decrement && decrement < test);
    // The test jumps back to the first body instruction
    assert_eq!(branch_target(code, test), code.instructions[body].0);
    assert_eq!(code.instructions[test + 1].1.opcode(), ILOAD_1);
}

#[test]
fn for_runs_update_before_back_edge() {
    let classes = compile_source(
        r#"
class T {
    static int m(int n) {
        int sum = 0;
        for (int i = 0; i < n; i++) {
            sum = sum + i;
        }
        return sum;
    }
}
"#,
    );
    let code = code_of(&classes, "T", "m");
    assert_eq!(code.count(IF_ICMPGE), 1);
    assert_eq!(code.count(GOTO), 1);

    let test = index_of(code, IF_ICMPGE);
    let back_edge = index_of(code, GOTO);
    let update = iinc_indices(code, 2, 1);
    assert_eq!(update, vec![back_edge - 1]);
    // The back edge re-evaluates the condition, which exits past it
    let top = branch_target(code, back_edge);
    assert!(top < code.instructions[test].0);
    assert_eq!(code.instructions[test - 2].0, top);
    assert_eq!(branch_target(code, test), code.instructions[back_edge + 1].0);
}

#[test]
fn continue_in_for_jumps_to_update() {
    let classes = compile_source(
        r#"
class T {
    static int m(int n) {
        int odd = 0;
        for (int i = 0; i < n; i++) {
            if (i % 2 == 0) {
                continue;
            }
            odd++;
        }
        return odd;
    }
}
"#,
    );
    let code = code_of(&classes, "T", "m");
    assert_eq!(code.count(GOTO), 2);

    let update = iinc_indices(code, 2, 1);
    assert_eq!(update.len(), 1);
    let update_offset = code.instructions[update[0]].0;
    let continue_jump = index_of(code, GOTO);
    assert!(continue_jump < update[0]);
    assert_eq!(branch_target(code, continue_jump), update_offset);
    // The loop body proper is skipped by the continue
    let odd = iinc_indices(code, 1, 1);
    assert_eq!(odd, vec![continue_jump + 1]);
    assert_eq!(code.instructions[update[0] + 1].1.opcode(), GOTO);
}

#[test]
fn continue_out_of_try_runs_finally_first() {
    let classes = compile_source(
        r#"
class T {
    static int m(int n) {
        int count = 0;
        for (int i = 0; i < n; i++) {
            try {
                if (i == 1) {
                    continue;
                }
                count++;
            } finally {
                count += 10;
            }
        }
        return count;
    }
}
"#,
    );
    let code = code_of(&classes, "T", "m");
    // Inlined before the continue, on normal completion and in the catch-any handler
    let finally_copies = iinc_indices(code, 1, 10);
    assert_eq!(finally_copies.len(), 3);
    assert_eq!(code.count(ATHROW), 1);

    let update_offset = code.instructions[iinc_indices(code, 2, 1)[0]].0;
    let exits: Vec<usize> = code
        .instructions
        .iter()
        .enumerate()
        .filter(|(index, (_, i))| i.opcode() == GOTO && branch_target(code, *index) == update_offset)
        .map(|(index, _)| index)
        .collect();
    assert_eq!(exits.len(), 2);
    for &exit in &exits {
        assert!(finally_copies.contains(&(exit - 1)), "no finally before exit {}", exit);
    }

    // The try range is split around the inlined continue path
    assert_eq!(code.exception_table.len(), 2);
    let handler = code.exception_table[0].handler_pc;
    let continue_jump = exits[0];
    for entry in &code.exception_table {
        assert_eq!(entry.catch_type, None);
        assert_eq!(entry.handler_pc, handler);
        for index in [continue_jump - 1, continue_jump] {
            let offset = code.instructions[index].0;
            assert!(offset < entry.start_pc || offset >= entry.end_pc);
        }
    }
    assert!(code.exception_table[0].end_pc <= code.exception_table[1].start_pc);
}

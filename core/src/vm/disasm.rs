use std::fmt::Write as _;

use super::bytecode::{Literal, Opcode, Program, jump_offset};

/// Renders `program` one instruction per line. Quickened instructions show
/// the state of their specialization slot after the generic form.
pub fn disassemble(program: &Program) -> String {
    let code = program.code();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "; args={} locals={} max_stack={} loops={}",
        program.arguments().len(),
        program.locals_count(),
        program.max_stack_depth(),
        program.loops().len()
    );
    for ip in program.instruction_starts() {
        let Some(op) = Opcode::from_byte(code[ip]) else {
            let _ = writeln!(out, "{ip:04}  <bad opcode {}>", code[ip]);
            break;
        };
        let _ = write!(out, "{ip:04}  {:<24}", op.name());
        if op.is_jump() {
            let offset = jump_offset(code, ip, op);
            let target = if op.is_backward_jump() { ip.wrapping_sub(offset) } else { ip + offset };
            let _ = write!(out, " -> {target:04}");
        } else if op.has_context_operand() {
            let _ = write!(out, " {} ctx {}", code[ip + 1], code[ip + 2]);
        } else if op == Opcode::ReturnNonLocal {
            let _ = write!(out, " ctx {}", code[ip + 1]);
        } else if op.len() == 2 {
            match program.literal(code[ip + 1]) {
                Some(Literal::Block(m)) => {
                    let _ = write!(out, " [block #{} args={}]", m.signature(), m.num_args() - 1);
                }
                Some(lit) => {
                    let _ = write!(out, " {lit:?}");
                }
                None => {
                    let _ = write!(out, " <literal {}?>", code[ip + 1]);
                }
            }
        }
        if let Some(spec) = program.quickened().get(ip) {
            let _ = write!(out, "  ; {} {}", spec.opcode().name(), spec.describe());
        }
        out.push('\n');
    }
    out
}

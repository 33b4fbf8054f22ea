//! The assembly pipeline.
//!
//! Wires the phases together: preamble scanning, metadata comments,
//! constant substitution, loop unrolling through an iterative line queue,
//! line parsing, and the final post-pass that resolves every operand
//! expression into an integer field.

use std::collections::{HashMap, VecDeque};

use mars_core::{Instruction, Metadata, Pid, Program, SimConfig};

use crate::errors::{AssemblyError, AssemblyErrorKind, SourceLocation};
use crate::expr::{EvalError, Expr};
use crate::parser::{parse_line, ParsedLine, SourceInstruction};
use crate::unroll::{capture_loop_body, substitute_loop_var, ConstantTable, SourceLine};

/// Assembles Redcode source into a [`Program`].
///
/// `file` is used only for error locations. The configuration supplies the
/// predefined standard symbols (`CORESIZE`, `MAXCYCLES`, ...).
///
/// # Errors
///
/// Returns the first [`AssemblyError`] encountered; assembly stops there.
pub fn assemble(source: &str, file: &str, config: &SimConfig) -> Result<Program, AssemblyError> {
    let lines = split_lines(source);

    // Everything before a `;redcode` marker is preamble and ignored.
    // Sources without a marker are active from the first line.
    let first_active = lines
        .iter()
        .position(|line| is_redcode_marker(line))
        .map_or(0, |index| index + 1);

    let mut queue: VecDeque<SourceLine> = lines[first_active..]
        .iter()
        .enumerate()
        .map(|(offset, text)| SourceLine {
            text: (*text).to_string(),
            line: first_active + offset + 1,
        })
        .collect();

    let at = |line: usize, column: usize| SourceLocation {
        file: file.to_string(),
        line,
        column,
    };

    let mut constants = ConstantTable::with_standard_symbols(config);
    let mut metadata = Metadata::default();
    let mut pending: Vec<(SourceInstruction, usize)> = Vec::new();
    let mut labels: HashMap<String, usize> = HashMap::new();
    let mut start_expr: Option<(Expr, usize)> = None;

    while let Some(SourceLine { text, line }) = queue.pop_front() {
        if text.trim_start().starts_with(';') {
            collect_metadata(&text, &mut metadata);
            continue;
        }

        // EQU definitions are recognized before substitution, so that a
        // redefinition reports as such instead of the already-substituted
        // name failing to parse.
        if let Some((name, rhs)) = equ_definition(&text) {
            if !constants.define(name, rhs) {
                return Err(AssemblyError {
                    kind: AssemblyErrorKind::RedefinedConstant(name.to_string()),
                    location: at(line, 1),
                });
            }
            continue;
        }

        let substituted = constants.substitute(&text).ok_or_else(|| AssemblyError {
            kind: AssemblyErrorKind::Syntax("cyclic EQU expansion".into()),
            location: at(line, 1),
        })?;

        match parse_line(&substituted, line).map_err(|error| error.in_file(file))? {
            ParsedLine::Blank => {}
            ParsedLine::Label { name } => {
                define_label(&mut labels, name, pending.len(), &at(line, 1))?;
            }
            ParsedLine::Equ { name, rhs } => {
                if !constants.define(&name, &rhs) {
                    return Err(AssemblyError {
                        kind: AssemblyErrorKind::RedefinedConstant(name),
                        location: at(line, 1),
                    });
                }
            }
            ParsedLine::Org { expr } => start_expr = Some((expr, line)),
            ParsedLine::End { expr } => {
                if let Some(expr) = expr {
                    start_expr = Some((expr, line));
                }
                break;
            }
            ParsedLine::For { var, count } => {
                expand_loop(&mut queue, &constants, var, &count, line, &at)?;
            }
            ParsedLine::Rof => {
                return Err(AssemblyError {
                    kind: AssemblyErrorKind::Syntax("ROF without matching FOR".into()),
                    location: at(line, 1),
                });
            }
            ParsedLine::Instruction { label, instruction } => {
                if let Some(name) = label {
                    define_label(&mut labels, name, pending.len(), &at(line, 1))?;
                }
                pending.push((instruction, line));
            }
        }
    }

    resolve(pending, labels, start_expr, metadata, &at)
}

/// Unrolls one `FOR` loop: captures the body, evaluates the count against
/// the current constants, and pushes the expanded iterations back onto the
/// front of the queue.
fn expand_loop(
    queue: &mut VecDeque<SourceLine>,
    constants: &ConstantTable,
    var: Option<String>,
    count: &Expr,
    line: usize,
    at: &impl Fn(usize, usize) -> SourceLocation,
) -> Result<(), AssemblyError> {
    let count = count
        .eval(&HashMap::new(), 0)
        .map_err(|error| AssemblyError {
            kind: eval_error_kind(error),
            location: at(line, 1),
        })?;
    let count = u32::try_from(count).map_err(|_| AssemblyError {
        kind: AssemblyErrorKind::Syntax(format!("FOR count {count} is negative")),
        location: at(line, 1),
    })?;

    let body = capture_loop_body(queue).ok_or_else(|| AssemblyError {
        kind: AssemblyErrorKind::ForWithoutRof,
        location: at(line, 1),
    })?;

    // Warriors are bounded by MAXLENGTH anyway; a runaway expansion only
    // burns memory before failing the length check at load.
    const MAX_EXPANDED_LINES: usize = 65_536;
    if body.len().saturating_mul(count as usize) > MAX_EXPANDED_LINES {
        return Err(AssemblyError {
            kind: AssemblyErrorKind::Syntax(format!("FOR expansion of {count} iterations is too large")),
            location: at(line, 1),
        });
    }

    let mut expanded = Vec::with_capacity(body.len() * count as usize);
    for iteration in 1..=count {
        for body_line in &body {
            // Constants first, so a constant may reference the loop
            // variable; then the variable itself.
            let text = constants
                .substitute(&body_line.text)
                .ok_or_else(|| AssemblyError {
                    kind: AssemblyErrorKind::Syntax("cyclic EQU expansion".into()),
                    location: at(body_line.line, 1),
                })?;
            let text = var
                .as_deref()
                .map_or(text.clone(), |name| substitute_loop_var(&text, name, iteration));
            expanded.push(SourceLine {
                text,
                line: body_line.line,
            });
        }
    }
    for source_line in expanded.into_iter().rev() {
        queue.push_front(source_line);
    }
    Ok(())
}

fn define_label(
    labels: &mut HashMap<String, usize>,
    name: String,
    offset: usize,
    location: &SourceLocation,
) -> Result<(), AssemblyError> {
    if labels.contains_key(&name) {
        return Err(AssemblyError {
            kind: AssemblyErrorKind::LabelCollision(name),
            location: location.clone(),
        });
    }
    labels.insert(name, offset);
    Ok(())
}

/// Post-pass: evaluates every operand expression at its instruction's
/// offset and assembles the final [`Program`].
fn resolve(
    pending: Vec<(SourceInstruction, usize)>,
    labels: HashMap<String, usize>,
    start_expr: Option<(Expr, usize)>,
    metadata: Metadata,
    at: &impl Fn(usize, usize) -> SourceLocation,
) -> Result<Program, AssemblyError> {
    let symbols: HashMap<String, i32> = labels
        .iter()
        .map(|(name, offset)| {
            let offset = i32::try_from(*offset).expect("program offsets fit i32");
            (name.clone(), offset)
        })
        .collect();

    let mut instructions = Vec::with_capacity(pending.len());
    for (offset, (source, line)) in pending.into_iter().enumerate() {
        let address = i32::try_from(offset).expect("program offsets fit i32");
        let a_field = eval_field(&source.a_expr, &symbols, address, line, at)?;
        let b_field = eval_field(&source.b_expr, &symbols, address, line, at)?;
        instructions.push(Instruction {
            pid: Pid::UNOWNED,
            opcode: source.opcode,
            modifier: source.modifier,
            a_mode: source.a_mode,
            a_field,
            b_mode: source.b_mode,
            b_field,
        });
    }

    let start = match start_expr {
        None => 0,
        Some((expr, line)) => {
            let value = expr.eval(&symbols, 0).map_err(|error| AssemblyError {
                kind: eval_error_kind(error),
                location: at(line, 1),
            })?;
            let start = usize::try_from(value).ok().filter(|&start| {
                start < instructions.len() || (start == 0 && instructions.is_empty())
            });
            start.ok_or_else(|| AssemblyError {
                kind: AssemblyErrorKind::Syntax(format!(
                    "start offset {value} is outside the program"
                )),
                location: at(line, 1),
            })?
        }
    };

    Ok(Program {
        instructions,
        start,
        labels,
        metadata,
    })
}

fn eval_field(
    expr: &Expr,
    symbols: &HashMap<String, i32>,
    address: i32,
    line: usize,
    at: &impl Fn(usize, usize) -> SourceLocation,
) -> Result<i32, AssemblyError> {
    let value = expr.eval(symbols, address).map_err(|error| AssemblyError {
        kind: eval_error_kind(error),
        location: at(line, 1),
    })?;
    // Symmetric range, so every assembled field re-parses as `-<digits>`.
    if value.unsigned_abs() > i64::from(i32::MAX).unsigned_abs() {
        return Err(AssemblyError {
            kind: AssemblyErrorKind::Syntax(format!("expression value {value} is out of range")),
            location: at(line, 1),
        });
    }
    Ok(i32::try_from(value).expect("range-checked value fits i32"))
}

fn eval_error_kind(error: EvalError) -> AssemblyErrorKind {
    match error {
        EvalError::UnknownSymbol(name) => AssemblyErrorKind::UnknownSymbol(name),
        EvalError::DivByZero => AssemblyErrorKind::DivByZeroInExpr,
    }
}

/// Recognizes a raw `name EQU rhs` line: `(name, rhs)` with the comment
/// stripped from the right side. A name that is itself an opcode or
/// pseudo-op never defines a constant; those lines go to the parser and
/// fail there.
fn equ_definition(text: &str) -> Option<(&str, &str)> {
    let stripped = text.find(';').map_or(text, |pos| &text[..pos]);

    let name_end = {
        let trimmed = stripped.trim_start();
        let name_start = stripped.len() - trimmed.len();
        let name_len = trimmed
            .find(|c: char| c.is_ascii_whitespace())
            .unwrap_or(trimmed.len());
        name_start + name_len
    };
    let name = stripped[..name_end].trim_start();
    if !crate::parser::is_identifier(name) || crate::parser::is_statement_keyword(name) {
        return None;
    }

    let rest = stripped[name_end..].trim_start();
    let keyword_len = rest
        .find(|c: char| c.is_ascii_whitespace())
        .unwrap_or(rest.len());
    if !rest[..keyword_len].eq_ignore_ascii_case("EQU") {
        return None;
    }
    Some((name, rest[keyword_len..].trim()))
}

/// Splits source into lines, accepting LF, CRLF, and bare-CR endings.
fn split_lines(source: &str) -> Vec<&str> {
    if source.contains('\n') {
        source.lines().collect()
    } else {
        source.split('\r').collect()
    }
}

fn is_redcode_marker(line: &str) -> bool {
    line.trim_start().starts_with(";redcode")
}

fn collect_metadata(line: &str, metadata: &mut Metadata) {
    let body = line.trim_start().trim_start_matches(';').trim_start();
    let Some((key, rest)) = body
        .split_once(char::is_whitespace)
        .or_else(|| (!body.is_empty()).then_some((body, "")))
    else {
        return;
    };
    let value = rest.trim();
    match key.to_ascii_lowercase().as_str() {
        "name" => metadata.name = Some(value.to_string()),
        "author" => metadata.author = Some(value.to_string()),
        "strategy" => metadata.strategies.push(value.to_string()),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use mars_core::{AddressMode, Modifier, Opcode, SimConfig};

    use super::assemble;
    use crate::errors::AssemblyErrorKind;

    fn assemble_default(source: &str) -> mars_core::Program {
        assemble(source, "test.red", &SimConfig::default()).expect("assembles")
    }

    fn assemble_err(source: &str) -> crate::errors::AssemblyError {
        assemble(source, "test.red", &SimConfig::default()).expect_err("must fail")
    }

    #[test]
    fn imp_assembles_to_one_instruction() {
        let program = assemble_default("MOV.I $0, $1\n");
        assert_eq!(program.len(), 1);
        let imp = program.instructions[0];
        assert_eq!(imp.opcode, Opcode::Mov);
        assert_eq!(imp.modifier, Modifier::I);
        assert_eq!(imp.a_field, 0);
        assert_eq!(imp.b_field, 1);
        assert_eq!(program.start, 0);
    }

    #[test]
    fn labels_resolve_pc_relative() {
        let program = assemble_default(
            "top  JMP step\n\
             bomb DAT #0, #0\n\
             step JMP top\n",
        );
        assert_eq!(program.instructions[0].a_field, 2);
        assert_eq!(program.instructions[2].a_field, -2);
        assert_eq!(program.labels["bomb"], 1);
    }

    #[test]
    fn forward_references_work() {
        let program = assemble_default("JMP later\nlater DAT #0, #0\n");
        assert_eq!(program.instructions[0].a_field, 1);
    }

    #[test]
    fn org_sets_the_start_offset() {
        let program = assemble_default("ORG 1\nDAT #0, #0\nJMP $0\n");
        assert_eq!(program.start, 1);
    }

    #[test]
    fn end_expression_sets_the_start_offset() {
        let program = assemble_default("DAT #0, #0\nhot JMP $0\nEND hot\n");
        assert_eq!(program.start, 1);
    }

    #[test]
    fn lines_after_end_are_ignored() {
        let program = assemble_default("MOV $0, $1\nEND\nthis is not redcode\n");
        assert_eq!(program.len(), 1);
    }

    #[test]
    fn preamble_before_the_marker_is_ignored() {
        let program = assemble_default(
            "This paragraph describes the warrior\n\
             and would not parse as redcode.\n\
             ;redcode-94\n\
             MOV $0, $1\n",
        );
        assert_eq!(program.len(), 1);
    }

    #[test]
    fn metadata_comments_are_collected() {
        let program = assemble_default(
            ";name Dwarf\n\
             ;author A. K. Dewdney\n\
             ;strategy bomb every fourth cell\n\
             ;strategy never moves\n\
             DAT #0, #0\n",
        );
        assert_eq!(program.metadata.name.as_deref(), Some("Dwarf"));
        assert_eq!(program.metadata.author.as_deref(), Some("A. K. Dewdney"));
        assert_eq!(
            program.metadata.strategies,
            vec!["bomb every fourth cell", "never moves"]
        );
    }

    #[test]
    fn equ_constants_substitute() {
        let program = assemble_default("STEP EQU 4\nADD.AB #STEP, $3\n");
        assert_eq!(program.instructions[0].a_field, 4);
    }

    #[test]
    fn equ_may_reference_other_constants() {
        let program = assemble_default("A EQU B + 1\nB EQU 2\nDAT #A, #0\n");
        assert_eq!(program.instructions[0].a_field, 3);
    }

    #[test]
    fn standard_symbols_are_predefined() {
        let program = assemble_default("DAT #CORESIZE - 1, #MAXLENGTH\n");
        assert_eq!(program.instructions[0].a_field, 7999);
        assert_eq!(program.instructions[0].b_field, 100);
    }

    #[test]
    fn redefined_constant_is_an_error() {
        let error = assemble_err("X EQU 1\nX EQU 2\nDAT #0, #0\n");
        assert_eq!(error.kind, AssemblyErrorKind::RedefinedConstant("X".into()));
        assert_eq!(error.location.line, 2);
    }

    #[test]
    fn unknown_symbol_is_fatal_in_the_post_pass() {
        let error = assemble_err("JMP nowhere\n");
        assert_eq!(error.kind, AssemblyErrorKind::UnknownSymbol("nowhere".into()));
    }

    #[test]
    fn label_collision_is_an_error() {
        let error = assemble_err("x DAT #0, #0\nx DAT #0, #0\n");
        assert_eq!(error.kind, AssemblyErrorKind::LabelCollision("x".into()));
    }

    #[test]
    fn division_by_zero_in_expression_is_fatal() {
        let error = assemble_err("DAT #1 / 0, #0\n");
        assert_eq!(error.kind, AssemblyErrorKind::DivByZeroInExpr);
    }

    #[test]
    fn for_unrolls_the_body() {
        let program = assemble_default(
            "COUNT EQU 3\n\
             LBL FOR COUNT\n\
             DAT #LBL, #0\n\
             ROF\n",
        );
        assert_eq!(program.len(), 3);
        for (offset, instruction) in program.instructions.iter().enumerate() {
            assert_eq!(instruction.opcode, Opcode::Dat);
            let expected = i32::try_from(offset).expect("small offset") + 1;
            assert_eq!(instruction.a_field, expected);
        }
    }

    #[test]
    fn for_zero_emits_nothing() {
        let program = assemble_default("FOR 0\nDAT #0, #0\nROF\nJMP $0\n");
        assert_eq!(program.len(), 1);
        assert_eq!(program.instructions[0].opcode, Opcode::Jmp);
    }

    #[test]
    fn for_one_binds_the_padded_variable() {
        let program = assemble_default("i FOR 1\nDAT #i, #&i\nROF\n");
        assert_eq!(program.len(), 1);
        assert_eq!(program.instructions[0].a_field, 1);
        assert_eq!(program.instructions[0].b_field, 1);
    }

    #[test]
    fn nested_loops_multiply() {
        let program = assemble_default(
            "outer FOR 2\n\
             inner FOR 3\n\
             DAT #outer, #inner\n\
             ROF\n\
             ROF\n",
        );
        assert_eq!(program.len(), 6);
        let pairs: Vec<(i32, i32)> = program
            .instructions
            .iter()
            .map(|instruction| (instruction.a_field, instruction.b_field))
            .collect();
        assert_eq!(pairs, vec![(1, 1), (1, 2), (1, 3), (2, 1), (2, 2), (2, 3)]);
    }

    #[test]
    fn unclosed_for_is_an_error() {
        let error = assemble_err("FOR 2\nDAT #0, #0\n");
        assert_eq!(error.kind, AssemblyErrorKind::ForWithoutRof);
    }

    #[test]
    fn stray_rof_is_an_error() {
        let error = assemble_err("ROF\n");
        assert!(matches!(error.kind, AssemblyErrorKind::Syntax(_)));
    }

    #[test]
    fn negative_for_count_is_an_error() {
        let error = assemble_err("FOR 0 - 2\nDAT #0, #0\nROF\n");
        assert!(matches!(error.kind, AssemblyErrorKind::Syntax(_)));
    }

    #[test]
    fn start_offset_outside_the_program_is_an_error() {
        let error = assemble_err("ORG 5\nDAT #0, #0\n");
        assert!(matches!(error.kind, AssemblyErrorKind::Syntax(_)));
    }

    #[test]
    fn crlf_sources_parse() {
        let program = assemble_default("MOV $0, $1\r\nDAT #0, #0\r\n");
        assert_eq!(program.len(), 2);
    }

    #[test]
    fn error_location_carries_the_file_name() {
        let error = assemble_err("MOV.QQ $0, $1\n");
        assert_eq!(error.location.file, "test.red");
        assert_eq!(error.location.line, 1);
    }
}

//! Property tests for the parser: span laws, ignorables-invariance, operator
//! associativity, and rejection properties.

use aster_ast::{BinOp, Expr, ExprKind, IdForm, LitKind, Span, TemplateSegment};
use aster_syntax::{is_keyword, parse_expr};
use proptest::prelude::*;

/// Expression snippets covering every prefix alternative of the grammar.
const CORPUS: &[&str] = &[
    "42",
    "-0x2a",
    "1 + 2 * 3",
    "a && b || c",
    "xs |> map f |> sum",
    "f x y",
    "foo.bar.baz",
    "List.Core.map xs",
    "x y => x + y",
    "_ctx",
    "(x) as Maybe a",
    "if a then b else c",
    "where xs is [a, ...rest] => a is [] => 0",
    "where x is n if n > 0 => n",
    "{ let x = 1 ret x }",
    "{ run f (1) ret () }",
    "{ foo: 1, bar }",
    "[1, [2, 3], []]",
    "\"hello\\n\"",
    "`hi ${name}!`",
    "#some (1) (2)",
    "a :: b :: []",
];

fn direct_children(expr: &Expr) -> Vec<&Expr> {
    let mut out: Vec<&Expr> = Vec::new();
    match &expr.node {
        ExprKind::Access { expr, .. } => out.push(expr),
        ExprKind::Apply { func, args } => {
            out.push(func);
            out.extend(args.iter());
        }
        ExprKind::Annotation { expr, .. } => out.push(expr),
        ExprKind::Block { bindings, ret } => {
            out.extend(bindings.iter().map(|(_, value)| value));
            out.push(ret);
        }
        ExprKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            out.push(condition);
            out.push(then_branch);
            out.push(else_branch);
        }
        ExprKind::Identifier(_) => {}
        ExprKind::Infix { left, right, .. } => {
            out.push(left);
            out.push(right);
        }
        ExprKind::Lambda { body, .. } => out.push(body),
        ExprKind::Lit(lit) => match lit {
            LitKind::Array(items) => out.extend(items.iter()),
            LitKind::Record(fields) => out.extend(fields.iter().map(|(_, value)| value)),
            LitKind::Template(segments) => {
                for segment in segments {
                    if let TemplateSegment::Expr(inner) = segment {
                        out.push(inner);
                    }
                }
            }
            LitKind::Variant { args, .. } => out.extend(args.iter()),
            _ => {}
        },
        ExprKind::Match { scrutinee, arms } => {
            out.push(scrutinee);
            for arm in arms {
                if let Some(guard) = &arm.guard {
                    out.push(guard);
                }
                out.push(&arm.body);
            }
        }
    }
    out
}

/// Check the span laws on every node of the tree: ordered endpoints, parent
/// coverage, the infix operand-extent law, and keyword hygiene.
fn check_tree(expr: &Expr) {
    assert!(
        expr.span.start <= expr.span.end,
        "span runs backwards: {:?}",
        expr.span
    );
    if let ExprKind::Infix { left, right, .. } = &expr.node {
        assert_eq!(
            expr.span,
            Span::new(left.span.start, right.span.end),
            "infix span must be the operand extent"
        );
    }
    if let ExprKind::Identifier(IdForm::Local(name)) = &expr.node {
        assert!(!is_keyword(name), "keyword leaked into an identifier: {name}");
    }
    for child in direct_children(expr) {
        assert!(
            expr.span.covers(child.span),
            "parent {:?} does not cover child {:?}",
            expr.span,
            child.span
        );
        check_tree(child);
    }
}

fn strip_spans(expr: &mut Expr) {
    expr.span = Span::synthetic();
    match &mut expr.node {
        ExprKind::Access { expr, .. } => strip_spans(expr),
        ExprKind::Apply { func, args } => {
            strip_spans(func);
            for arg in args {
                strip_spans(arg);
            }
        }
        ExprKind::Annotation { expr, .. } => strip_spans(expr),
        ExprKind::Block { bindings, ret } => {
            for (_, value) in bindings {
                strip_spans(value);
            }
            strip_spans(ret);
        }
        ExprKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            strip_spans(condition);
            strip_spans(then_branch);
            strip_spans(else_branch);
        }
        ExprKind::Identifier(_) => {}
        ExprKind::Infix { left, right, .. } => {
            strip_spans(left);
            strip_spans(right);
        }
        ExprKind::Lambda { body, .. } => strip_spans(body),
        ExprKind::Lit(lit) => match lit {
            LitKind::Array(items) => {
                for item in items {
                    strip_spans(item);
                }
            }
            LitKind::Record(fields) => {
                for (_, value) in fields {
                    strip_spans(value);
                }
            }
            LitKind::Template(segments) => {
                for segment in segments {
                    if let TemplateSegment::Expr(inner) = segment {
                        strip_spans(inner);
                    }
                }
            }
            LitKind::Variant { args, .. } => {
                for arg in args {
                    strip_spans(arg);
                }
            }
            _ => {}
        },
        ExprKind::Match { scrutinee, arms } => {
            strip_spans(scrutinee);
            for arm in arms {
                if let Some(guard) = &mut arm.guard {
                    strip_spans(guard);
                }
                strip_spans(&mut arm.body);
            }
        }
    }
}

fn parsed(source: &str) -> Expr {
    parse_expr(source).unwrap_or_else(|err| panic!("corpus entry failed: {source:?}: {err}"))
}

fn ignorable_pad() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            Just(" ".to_string()),
            Just("\t".to_string()),
            Just("\n".to_string()),
            Just("// note\n".to_string()),
        ],
        0..6,
    )
    .prop_map(|parts| parts.concat())
}

fn binop_of(spelling: &str) -> BinOp {
    match spelling {
        "|>" => BinOp::Pipe,
        ">>" => BinOp::Compose,
        "==" => BinOp::Eq,
        "!=" => BinOp::NotEq,
        "<=" => BinOp::Lte,
        "<" => BinOp::Lt,
        ">=" => BinOp::Gte,
        ">" => BinOp::Gt,
        "&&" => BinOp::And,
        "||" => BinOp::Or,
        "::" => BinOp::Cons,
        "++" => BinOp::Join,
        "+" => BinOp::Add,
        "-" => BinOp::Sub,
        "*" => BinOp::Mul,
        "^" => BinOp::Pow,
        "%" => BinOp::Mod,
        other => panic!("unknown operator spelling {other:?}"),
    }
}

const LEFT_ASSOC: &[&str] = &["|>", "==", "!=", "<=", ">=", "<", ">", "+", "-", "*"];
const RIGHT_ASSOC: &[&str] = &["||", "&&", "::", "++", "^", "%", ">>"];

/// (looser, tighter) operator pairs from adjacent precedence levels.
const PRECEDENCE_PAIRS: &[(&str, &str)] = &[
    ("|>", "||"),
    ("||", "&&"),
    ("&&", "=="),
    ("==", "::"),
    ("::", "+"),
    ("+", "*"),
    ("*", ">>"),
];

#[test]
fn corpus_parses_and_satisfies_span_laws() {
    for source in CORPUS {
        check_tree(&parsed(source));
    }
}

proptest! {
    /// Surrounding a construct with arbitrary ignorables yields a
    /// structurally equal AST.
    #[test]
    fn ignorables_do_not_change_structure(
        index in 0..CORPUS.len(),
        prefix in ignorable_pad(),
        suffix in ignorable_pad(),
    ) {
        let source = CORPUS[index];
        let mut bare = parsed(source);
        let padded_source = format!("{prefix}{source}{suffix}");
        let mut padded = parsed(&padded_source);
        strip_spans(&mut bare);
        strip_spans(&mut padded);
        prop_assert_eq!(bare, padded);
    }

    /// Span laws hold under arbitrary leading ignorables, which shift every
    /// position in the tree.
    #[test]
    fn span_laws_hold_under_padding(
        index in 0..CORPUS.len(),
        prefix in ignorable_pad(),
    ) {
        let source = format!("{prefix}{}", CORPUS[index]);
        check_tree(&parsed(&source));
    }

    /// `a op b op c` associates to the left for left-associative operators.
    #[test]
    fn left_associative_operators(index in 0..LEFT_ASSOC.len()) {
        let spelling = LEFT_ASSOC[index];
        let op = binop_of(spelling);
        let expr = parsed(&format!("a {spelling} b {spelling} c"));
        match &expr.node {
            ExprKind::Infix { op: root, left, right } => {
                prop_assert_eq!(*root, op);
                prop_assert!(matches!(&left.node, ExprKind::Infix { op: inner, .. } if *inner == op), "left should be an Infix with the same operator");
                prop_assert!(matches!(&right.node, ExprKind::Identifier(_)), "right should be an Identifier");
            }
            other => prop_assert!(false, "expected Infix, got {:?}", other),
        }
    }

    /// `a op b op c` associates to the right for right-associative operators.
    #[test]
    fn right_associative_operators(index in 0..RIGHT_ASSOC.len()) {
        let spelling = RIGHT_ASSOC[index];
        let op = binop_of(spelling);
        let expr = parsed(&format!("a {spelling} b {spelling} c"));
        match &expr.node {
            ExprKind::Infix { op: root, left, right } => {
                prop_assert_eq!(*root, op);
                prop_assert!(matches!(&left.node, ExprKind::Identifier(_)), "left should be an Identifier");
                prop_assert!(matches!(&right.node, ExprKind::Infix { op: inner, .. } if *inner == op), "right should be an Infix with the same operator");
            }
            other => prop_assert!(false, "expected Infix, got {:?}", other),
        }
    }

    /// The tighter operator of each adjacent precedence pair wins the middle
    /// operand from either side.
    #[test]
    fn tighter_operators_bind_the_middle_operand(index in 0..PRECEDENCE_PAIRS.len()) {
        let (looser, tighter) = PRECEDENCE_PAIRS[index];
        let loose_op = binop_of(looser);
        let tight_op = binop_of(tighter);

        let expr = parsed(&format!("a {looser} b {tighter} c"));
        match &expr.node {
            ExprKind::Infix { op, right, .. } => {
                prop_assert_eq!(*op, loose_op);
                prop_assert!(matches!(&right.node, ExprKind::Infix { op: inner, .. } if *inner == tight_op), "right should be an Infix with the tighter operator");
            }
            other => prop_assert!(false, "expected Infix, got {:?}", other),
        }

        let expr = parsed(&format!("a {tighter} b {looser} c"));
        match &expr.node {
            ExprKind::Infix { op, left, .. } => {
                prop_assert_eq!(*op, loose_op);
                prop_assert!(matches!(&left.node, ExprKind::Infix { op: inner, .. } if *inner == tight_op), "left should be an Infix with the tighter operator");
            }
            other => prop_assert!(false, "expected Infix, got {:?}", other),
        }
    }

    /// Trailing commas are rejected in array literals.
    #[test]
    fn array_trailing_comma_rejected(items in prop::collection::vec(0u8..100, 1..5)) {
        let body = items
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        prop_assert!(parse_expr(&format!("[{body}]")).is_ok(), "array literal should parse");
        prop_assert!(parse_expr(&format!("[{body}, ]")).is_err(), "trailing comma should be rejected");
    }

    /// A number immediately followed by an alphabetic character is an error.
    #[test]
    fn number_followed_by_letter_rejected(n in 0u32..100_000, letter in proptest::char::range('a', 'z')) {
        prop_assert!(parse_expr(&format!("{n}{letter}")).is_err(), "number followed by a letter should be rejected");
    }
}

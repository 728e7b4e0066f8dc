//! Minimal evaluator for the formulas the ledger writes.
//!
//! Supports decimal literals, A1 cell references, `SUM(X1:Y9)`, parentheses,
//! unary minus and the four arithmetic operators. Empty cells count as zero.
//! Text cells are skipped by `SUM` and are an error in arithmetic, as in a
//! spreadsheet.

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::sheet::Cell;

const MAX_DEPTH: usize = 32;

/// A grid of cells, `grid[row][col]`, both 0-based
pub(crate) type Grid = [Vec<Cell>];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Decimal),
    Cell { col: usize, row: usize },
    Range { from: (usize, usize), to: (usize, usize) },
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

fn column_index(letters: &str) -> usize {
    letters
        .bytes()
        .fold(0, |acc, b| acc * 26 + (b.to_ascii_uppercase() - b'A') as usize + 1)
        - 1
}

fn parse_cell(text: &str) -> Option<(usize, usize)> {
    let split = text.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = text.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let row: usize = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((column_index(letters), row - 1))
}

fn tokenize(expr: &str) -> Option<Vec<Token>> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' => i += 1,
            '+' | '-' | '*' | '/' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Number(Decimal::from_str(&text).ok()?));
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == ':') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                if let Some((from, to)) = text.split_once(':') {
                    tokens.push(Token::Range {
                        from: parse_cell(from)?,
                        to: parse_cell(to)?,
                    });
                } else if let Some((col, row)) = parse_cell(&text) {
                    tokens.push(Token::Cell { col, row });
                } else {
                    tokens.push(Token::Ident(text.to_ascii_uppercase()));
                }
            }
            _ => return None,
        }
    }

    Some(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    grid: &'a Grid,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Option<Decimal> {
        let mut value = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' {
                value.checked_add(rhs)?
            } else {
                value.checked_sub(rhs)?
            };
        }
        Some(value)
    }

    fn term(&mut self) -> Option<Decimal> {
        let mut value = self.factor()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.factor()?;
            value = if op == '*' {
                value.checked_mul(rhs)?
            } else {
                value.checked_div(rhs)?
            };
        }
        Some(value)
    }

    fn factor(&mut self) -> Option<Decimal> {
        match self.next()? {
            Token::Number(n) => Some(n),
            Token::Op('-') => Some(-self.factor()?),
            Token::Cell { col, row } => cell_value(self.grid, col, row, self.depth + 1),
            Token::LParen => {
                let value = self.expr()?;
                match self.next()? {
                    Token::RParen => Some(value),
                    _ => None,
                }
            }
            Token::Ident(name) if name == "SUM" => {
                if self.next()? != Token::LParen {
                    return None;
                }
                let Token::Range { from, to } = self.next()? else {
                    return None;
                };
                if self.next()? != Token::RParen {
                    return None;
                }
                sum_range(self.grid, from, to, self.depth + 1)
            }
            _ => None,
        }
    }
}

fn sum_range(grid: &Grid, from: (usize, usize), to: (usize, usize), depth: usize) -> Option<Decimal> {
    let (col_lo, col_hi) = (from.0.min(to.0), from.0.max(to.0));
    let (row_lo, row_hi) = (from.1.min(to.1), from.1.max(to.1));
    let mut total = Decimal::ZERO;

    for row in row_lo..=row_hi {
        for col in col_lo..=col_hi {
            let value = match cell_at(grid, col, row) {
                Some(Cell::Number(n)) => *n,
                Some(Cell::Formula(formula)) => evaluate_at(grid, formula, depth)?,
                _ => continue,
            };
            total = total.checked_add(value)?;
        }
    }

    Some(total)
}

fn cell_at(grid: &Grid, col: usize, row: usize) -> Option<&Cell> {
    grid.get(row).and_then(|r| r.get(col))
}

fn cell_value(grid: &Grid, col: usize, row: usize, depth: usize) -> Option<Decimal> {
    match cell_at(grid, col, row) {
        None | Some(Cell::Empty) => Some(Decimal::ZERO),
        Some(Cell::Number(n)) => Some(*n),
        Some(Cell::Formula(formula)) => evaluate_at(grid, formula, depth),
        Some(Cell::Text(text)) => Decimal::from_str(text.trim()).ok(),
    }
}

fn evaluate_at(grid: &Grid, formula: &str, depth: usize) -> Option<Decimal> {
    if depth > MAX_DEPTH {
        return None;
    }
    let body = formula.strip_prefix('=')?;
    let mut parser = Parser {
        tokens: tokenize(body)?,
        pos: 0,
        grid,
        depth,
    };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return None;
    }
    Some(value)
}

/// Evaluate a formula (with leading `=`) against `grid`.
///
/// Returns `None` for anything the evaluator cannot handle, including
/// circular references.
pub(crate) fn evaluate(grid: &Grid, formula: &str) -> Option<Decimal> {
    evaluate_at(grid, formula, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<Cell>> {
        rows.iter()
            .map(|r| r.iter().map(|c| Cell::user_entered(c)).collect())
            .collect()
    }

    #[test]
    fn test_margin_formula() {
        let g = grid(&[&["", "", "Blue Jacket", "25.00", "=D1-D1/5"]]);
        assert_eq!(evaluate(&g, "=D1-D1/5"), Some(Decimal::from(20)));
    }

    #[test]
    fn test_sum_skips_text_and_follows_formulas() {
        let g = grid(&[
            &["", "", "A", "10", "=D1-D1/5"],
            &["", "", "B", "5", "=D2-D2/5"],
            &["", "", "note", "n/a", ""],
        ]);
        assert_eq!(evaluate(&g, "=SUM(D1:D3)"), Some(Decimal::from(15)));
        assert_eq!(evaluate(&g, "=SUM(E1:E3)"), Some(Decimal::from(12)));
    }

    #[test]
    fn test_precedence_and_parens() {
        let g = grid(&[]);
        assert_eq!(evaluate(&g, "=2+3*4"), Some(Decimal::from(14)));
        assert_eq!(evaluate(&g, "=(2+3)*4"), Some(Decimal::from(20)));
        assert_eq!(evaluate(&g, "=-2+5"), Some(Decimal::from(3)));
    }

    #[test]
    fn test_errors() {
        let g = grid(&[&["=A1"]]);
        assert_eq!(evaluate(&g, "=A1"), None);
        assert_eq!(evaluate(&g, "=1/0"), None);
        assert_eq!(evaluate(&g, "=AVG(A1:A2)"), None);
        assert_eq!(evaluate(&g, "=1+"), None);
    }

    #[test]
    fn test_overflow_is_an_error() {
        let max = Decimal::MAX.to_string();
        let max = max.as_str();
        let g = grid(&[&[max], &[max], &["=A1+A2"]]);
        assert_eq!(evaluate(&g, "=A1+A2"), None);
        assert_eq!(evaluate(&g, "=SUM(A1:A2)"), None);
        assert_eq!(evaluate(&g, "=-A1-A2"), None);
        assert_eq!(evaluate(&g, "=SUM(A3:A3)"), None);
    }

    #[test]
    fn test_text_cells_are_not_formulas() {
        let g = vec![vec![Cell::Text("=1+1".to_string()), Cell::Number(Decimal::from(3))]];
        assert_eq!(evaluate(&g, "=SUM(A1:B1)"), Some(Decimal::from(3)));
    }
}

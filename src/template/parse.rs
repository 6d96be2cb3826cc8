//! Tag lexer and recursive block parser for the template interpolation language.

// std
use std::mem;
// self
use crate::{
	_prelude::*,
	error::TemplateError,
	template::ast::{Expr, Node, Span},
};

/// Name of the builtin helper resolving to the current range sub-region id.
pub const ID_HELPER: &str = "id";

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Parses template source into a node list, validating helper names against `helpers`.
pub fn parse(source: &str, helpers: &HashSet<String>) -> Result<Vec<Node>, TemplateError> {
	let mut cursor = Cursor { src: source, pos: 0, line: 1, column: 1 };
	let mut pending: Vec<PendingBlock> = Vec::new();
	let mut current: Vec<Node> = Vec::new();

	while let Some(offset) = cursor.rest().find(OPEN) {
		let text = &cursor.rest()[..offset];

		if !text.is_empty() {
			current.push(Node::Text(text.into()));
			cursor.advance(offset);
		}

		let span = cursor.span();
		let tag_body_start = cursor.pos + OPEN.len();
		let Some(close) = cursor.src[tag_body_start..].find(CLOSE) else {
			return Err(TemplateError::Parse {
				line: span.line,
				column: span.column,
				message: "unclosed tag".into(),
			});
		};
		let content = &cursor.src[tag_body_start..tag_body_start + close];

		cursor.advance(OPEN.len() + close + CLOSE.len());

		match classify(content, span, helpers)? {
			Tag::If(cond) => {
				pending.push(PendingBlock::open(BlockKind::If(cond), span, &mut current));
			},
			Tag::Range(over) => {
				pending.push(PendingBlock::open(BlockKind::Range(over), span, &mut current));
			},
			Tag::With(bind) => {
				pending.push(PendingBlock::open(BlockKind::With(bind), span, &mut current));
			},
			Tag::Else => {
				let Some(block) = pending.last_mut() else {
					return Err(unbalanced("else", span));
				};

				if matches!(block.kind, BlockKind::With(_)) || block.in_secondary {
					return Err(unbalanced("else", span));
				}

				block.primary = mem::take(&mut current);
				block.in_secondary = true;
			},
			Tag::End => {
				let Some(mut block) = pending.pop() else {
					return Err(unbalanced("end", span));
				};

				if block.in_secondary {
					block.secondary = mem::take(&mut current);
				} else {
					block.primary = mem::take(&mut current);
				}

				let parent_nodes = mem::take(&mut block.parent_nodes);
				let node = block.into_node();

				current = parent_nodes;
				current.push(node);
			},
			Tag::Interp(expr) => current.push(Node::Interp { expr, span }),
		}
	}

	if let Some(block) = pending.last() {
		return Err(unbalanced(block.kind.construct(), block.span));
	}
	if !cursor.rest().is_empty() {
		current.push(Node::Text(cursor.rest().into()));
	}

	Ok(current)
}

struct Cursor<'a> {
	src: &'a str,
	pos: usize,
	line: u32,
	column: u32,
}
impl Cursor<'_> {
	fn rest(&self) -> &str {
		&self.src[self.pos..]
	}

	fn span(&self) -> Span {
		Span { line: self.line, column: self.column }
	}

	fn advance(&mut self, len: usize) {
		for c in self.src[self.pos..self.pos + len].chars() {
			if c == '\n' {
				self.line += 1;
				self.column = 1;
			} else {
				self.column += 1;
			}
		}

		self.pos += len;
	}
}

enum Tag {
	If(Expr),
	Range(Expr),
	With(Expr),
	Else,
	End,
	Interp(Expr),
}

enum BlockKind {
	If(Expr),
	Range(Expr),
	With(Expr),
}
impl BlockKind {
	fn construct(&self) -> &'static str {
		match self {
			Self::If(_) => "if",
			Self::Range(_) => "range",
			Self::With(_) => "with",
		}
	}
}

struct PendingBlock {
	kind: BlockKind,
	span: Span,
	parent_nodes: Vec<Node>,
	primary: Vec<Node>,
	secondary: Vec<Node>,
	in_secondary: bool,
}
impl PendingBlock {
	fn open(kind: BlockKind, span: Span, current: &mut Vec<Node>) -> Self {
		Self {
			kind,
			span,
			parent_nodes: mem::take(current),
			primary: Vec::new(),
			secondary: Vec::new(),
			in_secondary: false,
		}
	}

	fn into_node(self) -> Node {
		match self.kind {
			BlockKind::If(cond) => Node::If {
				cond,
				then: self.primary,
				otherwise: self.secondary,
				span: self.span,
			},
			BlockKind::Range(over) =>
				Node::Range { over, body: self.primary, empty: self.secondary, span: self.span },
			BlockKind::With(bind) => Node::With { bind, body: self.primary, span: self.span },
		}
	}
}

fn unbalanced(construct: &'static str, span: Span) -> TemplateError {
	TemplateError::Unbalanced { construct, line: span.line, column: span.column }
}

fn classify(content: &str, span: Span, helpers: &HashSet<String>) -> Result<Tag, TemplateError> {
	let trimmed = content.trim();
	let (keyword, rest) = match trimmed.split_once(char::is_whitespace) {
		Some((keyword, rest)) => (keyword, rest.trim()),
		None => (trimmed, ""),
	};

	match keyword {
		"if" => Ok(Tag::If(parse_expr(rest, span, helpers)?)),
		"range" => Ok(Tag::Range(parse_expr(rest, span, helpers)?)),
		"with" => Ok(Tag::With(parse_expr(rest, span, helpers)?)),
		"else" if rest.is_empty() => Ok(Tag::Else),
		"end" if rest.is_empty() => Ok(Tag::End),
		"else" | "end" => Err(TemplateError::Parse {
			line: span.line,
			column: span.column,
			message: format!("`{keyword}` takes no arguments"),
		}),
		_ => Ok(Tag::Interp(parse_expr(trimmed, span, helpers)?)),
	}
}

fn expr_error(span: Span, message: String) -> TemplateError {
	TemplateError::Parse { line: span.line, column: span.column, message }
}

fn parse_expr(view: &str, span: Span, helpers: &HashSet<String>) -> Result<Expr, TemplateError> {
	let tokens = tokenize(view).map_err(|message| expr_error(span, message))?;
	let mut terms = Vec::with_capacity(tokens.len());
	let mut head_ident = None;

	for (idx, token) in tokens.into_iter().enumerate() {
		match token {
			Token::Ident(name) if idx == 0 => head_ident = Some(name),
			Token::Ident(name) => {
				return Err(expr_error(
					span,
					format!("helper arguments must be paths or literals, got `{name}`"),
				));
			},
			Token::Term(expr) => terms.push(expr),
		}
	}

	match head_ident {
		Some(name) => {
			if name != ID_HELPER && !helpers.contains(&name) {
				return Err(TemplateError::UnknownHelper {
					name,
					line: span.line,
					column: span.column,
				});
			}

			Ok(Expr::Helper { name, args: terms })
		},
		None => match terms.len() {
			0 => Err(expr_error(span, "empty expression".into())),
			1 => Ok(terms.swap_remove(0)),
			_ => Err(expr_error(span, "expected a single expression".into())),
		},
	}
}

enum Token {
	Term(Expr),
	Ident(String),
}

fn tokenize(view: &str) -> Result<Vec<Token>, String> {
	let mut tokens = Vec::new();
	let mut chars = view.char_indices().peekable();

	while let Some(&(at, c)) = chars.peek() {
		if c.is_whitespace() {
			chars.next();

			continue;
		}

		match c {
			'"' => {
				chars.next();

				let mut literal = String::new();
				let mut closed = false;

				loop {
					match chars.next() {
						Some((_, '\\')) => match chars.next() {
							Some((_, 'n')) => literal.push('\n'),
							Some((_, 't')) => literal.push('\t'),
							Some((_, escaped)) => literal.push(escaped),
							None => return Err("unterminated string escape".into()),
						},
						Some((_, '"')) => {
							closed = true;

							break;
						},
						Some((_, c)) => literal.push(c),
						None => break,
					}
				}

				if !closed {
					return Err("unterminated string literal".into());
				}

				tokens.push(Token::Term(Expr::Str(literal)));
			},
			'.' => {
				let word = take_word(view, at, &mut chars);

				tokens.push(Token::Term(parse_path(word)?));
			},
			c if c.is_ascii_digit() || c == '-' => {
				let word = take_word(view, at, &mut chars);
				let term = if let Ok(int) = word.parse::<i64>() {
					Expr::Int(int)
				} else if let Ok(float) = word.parse::<f64>() {
					Expr::Float(float)
				} else {
					return Err(format!("invalid number literal `{word}`"));
				};

				tokens.push(Token::Term(term));
			},
			c if is_ident_char(c) => {
				let word = take_word(view, at, &mut chars);

				match word {
					"true" => tokens.push(Token::Term(Expr::Bool(true))),
					"false" => tokens.push(Token::Term(Expr::Bool(false))),
					_ => tokens.push(Token::Ident(word.into())),
				}
			},
			_ => return Err(format!("unexpected character `{c}`")),
		}
	}

	Ok(tokens)
}

fn take_word<'a>(
	view: &'a str,
	start: usize,
	chars: &mut std::iter::Peekable<std::str::CharIndices<'a>>,
) -> &'a str {
	let mut end = view.len();

	while let Some(&(at, c)) = chars.peek() {
		if c.is_whitespace() {
			end = at;

			break;
		}

		chars.next();
	}

	&view[start..end]
}

fn parse_path(word: &str) -> Result<Expr, String> {
	if word == "." {
		return Ok(Expr::Current);
	}

	let segments = word[1..]
		.split('.')
		.map(|segment| {
			if segment.is_empty() || !segment.chars().all(is_ident_char) {
				Err(format!("invalid path `{word}`"))
			} else {
				Ok(segment.to_owned())
			}
		})
		.collect::<Result<Vec<_>, _>>()?;

	Ok(Expr::Path(segments))
}

fn is_ident_char(c: char) -> bool {
	c.is_ascii_alphanumeric() || c == '_'
}

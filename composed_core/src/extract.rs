use std::collections::HashSet;
use std::ops::Range;

use logos::Logos;

use crate::VariableRegistry;

/// Raw tokens produced by logos. Every byte of a template belongs to exactly
/// one of these, so the lexer never reports an error for valid UTF-8.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum RawToken {
	#[token("{")]
	BraceOpen,
	#[token("}")]
	BraceClose,
	#[regex(r"[a-zA-Z0-9_]+")]
	Word,
	#[regex(r"[^{}a-zA-Z0-9_]+")]
	Text,
}

/// The syntax a reference was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
	/// `{name}`: substituted unconditionally.
	Bracket,
	/// `name`: substituted only when the registry knows the name.
	Bare,
}

/// A variable reference located in a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
	pub kind: ReferenceKind,
	/// The referenced variable name. For brackets this is the raw text
	/// between the braces.
	pub name: String,
	/// Byte range of the whole reference, braces included.
	pub span: Range<usize>,
}

/// Every syntactic reference in a template, ordered by position. Bare words
/// that sit inside a bracket reference are not listed: the bracket owns that
/// region of the template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateScan {
	pub references: Vec<Reference>,
}

impl TemplateScan {
	/// Bracket references, in template order.
	pub fn brackets(&self) -> impl Iterator<Item = &Reference> {
		self.references
			.iter()
			.filter(|reference| reference.kind == ReferenceKind::Bracket)
	}

	/// Bare word candidates, in template order. These still need to be
	/// checked against a registry.
	pub fn bare_words(&self) -> impl Iterator<Item = &Reference> {
		self.references
			.iter()
			.filter(|reference| reference.kind == ReferenceKind::Bare)
	}
}

/// Walks the logos token stream and collects both kinds of reference.
struct ReferenceScanner<'a> {
	/// The template being scanned.
	source: &'a str,
	/// The collected raw tokens and their byte spans.
	raw_tokens: Vec<(Result<RawToken, ()>, Range<usize>)>,
}

impl<'a> ReferenceScanner<'a> {
	fn new(source: &'a str) -> Self {
		let raw_tokens = RawToken::lexer(source).spanned().collect();
		Self { source, raw_tokens }
	}

	fn is_token(&self, index: usize, token: RawToken) -> bool {
		matches!(self.raw_tokens.get(index), Some((Ok(raw), _)) if *raw == token)
	}

	/// Leftmost-first, non-overlapping `{…}` matches where the braces enclose
	/// at least one character and no `}`.
	fn brackets(&self) -> Vec<Reference> {
		let mut references = Vec::new();
		let mut cursor = 0;

		while cursor < self.raw_tokens.len() {
			if !self.is_token(cursor, RawToken::BraceOpen) {
				cursor += 1;
				continue;
			}

			let Some(offset) = (cursor + 1..self.raw_tokens.len())
				.position(|index| self.is_token(index, RawToken::BraceClose))
			else {
				// No closing brace anywhere after this point, so nothing else
				// can match either.
				break;
			};

			// `{}` encloses nothing.
			if offset == 0 {
				cursor += 1;
				continue;
			}

			let close = cursor + 1 + offset;
			let open_span = &self.raw_tokens[cursor].1;
			let close_span = &self.raw_tokens[close].1;

			references.push(Reference {
				kind: ReferenceKind::Bracket,
				name: self.source[open_span.end..close_span.start].to_string(),
				span: open_span.start..close_span.end,
			});

			cursor = close + 1;
		}

		references
	}

	/// Identifier tokens on word boundaries that are not inside `brackets`.
	fn bare_words(&self, brackets: &[Reference]) -> Vec<Reference> {
		self.raw_tokens
			.iter()
			.filter(|(result, _)| matches!(result, Ok(RawToken::Word)))
			.filter_map(|(_, span)| {
				let word = &self.source[span.clone()];
				let starts_with_digit = word.bytes().next().is_some_and(|b| b.is_ascii_digit());

				if starts_with_digit || !self.on_word_boundary(span) {
					return None;
				}

				let inside_bracket = brackets.iter().any(|bracket| {
					bracket.span.start < span.end && span.start < bracket.span.end
				});

				(!inside_bracket).then(|| {
					Reference {
						kind: ReferenceKind::Bare,
						name: word.to_string(),
						span: span.clone(),
					}
				})
			})
			.collect()
	}

	/// A word token is only an identifier when no word character touches it.
	/// Word tokens are maximal ASCII runs, so this rejects tokens glued to
	/// non-ASCII letters such as `café_x`.
	fn on_word_boundary(&self, span: &Range<usize>) -> bool {
		let before = self.source[..span.start].chars().next_back();
		let after = self.source[span.end..].chars().next();

		!before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
	}
}

/// Letters, digits, `_` and combining marks. A mark attached to a word
/// extends it, so `x\u{301}` is not the identifier `x`. Marks are recognised
/// by the combining diacritical blocks.
fn is_word_char(ch: char) -> bool {
	ch.is_alphanumeric() || ch == '_' || is_combining_mark(ch)
}

fn is_combining_mark(ch: char) -> bool {
	matches!(
		ch,
		'\u{0300}'..='\u{036F}'
			| '\u{1AB0}'..='\u{1AFF}'
			| '\u{1DC0}'..='\u{1DFF}'
			| '\u{20D0}'..='\u{20FF}'
			| '\u{FE20}'..='\u{FE2F}'
	)
}

/// Find every bracket reference and bare word candidate in `template`
/// without consulting a registry.
pub fn scan_template(template: &str) -> TemplateScan {
	if template.is_empty() {
		return TemplateScan::default();
	}

	let scanner = ReferenceScanner::new(template);
	let brackets = scanner.brackets();
	let bare_words = scanner.bare_words(&brackets);

	let mut references = brackets;
	references.extend(bare_words);
	references.sort_by_key(|reference| reference.span.start);

	TemplateScan { references }
}

/// The variables `template` depends on: every bracket name, then every bare
/// word that exists in `registry` under any segment. Names appear once, in
/// order of first occurrence.
pub fn extract_variables(template: &str, registry: &dyn VariableRegistry) -> Vec<String> {
	let scan = scan_template(template);
	let mut seen = HashSet::new();
	let mut names = Vec::new();

	for reference in scan.brackets() {
		if seen.insert(reference.name.as_str()) {
			names.push(reference.name.clone());
		}
	}

	for reference in scan.bare_words() {
		if !seen.contains(reference.name.as_str()) && registry.contains_any(&reference.name) {
			seen.insert(reference.name.as_str());
			names.push(reference.name.clone());
		}
	}

	names
}

//! Four-part component addresses.
//!
//! # Role
//!
//! An [`Identity`] is the only external addressing scheme for registered components:
//! `domain.namespace.group.name`, each segment a normalized hyphen-token.
//!
//! # Invariants
//!
//! - Every segment is non-empty, lower-case, with no edge or doubled hyphens and no ASCII
//!   punctuation besides the hyphen.
//! - `normalize_token(normalize_token(x)) == normalize_token(x)` for any input.
//! - Two identities are equal iff all four normalized tokens match.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{IdentityError, IdentityField};

/// Top-level component category.
///
/// The set is closed: an unrecognized domain token is an [`IdentityError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Domain {
	Services,
	Codecs,
	PromptSections,
	Schemas,
	ProviderBackends,
	Providers,
	Persist,
}

impl Domain {
	/// All supported domains in label order.
	pub const ALL: [Domain; 7] = [
		Domain::Codecs,
		Domain::Persist,
		Domain::PromptSections,
		Domain::ProviderBackends,
		Domain::Providers,
		Domain::Schemas,
		Domain::Services,
	];

	/// Returns the canonical label token.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Services => "services",
			Self::Codecs => "codecs",
			Self::PromptSections => "prompt-sections",
			Self::Schemas => "schemas",
			Self::ProviderBackends => "provider-backends",
			Self::Providers => "providers",
			Self::Persist => "persist",
		}
	}

	/// Parses a domain token after normalization (`prompt_sections` and `Prompt Sections` both work).
	pub fn parse(raw: &str) -> Result<Self, IdentityError> {
		let token = normalize_token(raw);
		Self::ALL
			.into_iter()
			.find(|d| d.as_str() == token)
			.ok_or_else(|| IdentityError::UnsupportedDomain(raw.to_string()))
	}
}

impl fmt::Display for Domain {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Domain {
	type Err = IdentityError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

/// Normalizes one identity token.
///
/// `.`, `_`, `-` and whitespace are separators: runs collapse to one hyphen and edge
/// separators are trimmed. Every other character is kept and lower-cased.
pub fn normalize_token(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());
	let mut pending_sep = false;
	for ch in raw.chars() {
		if is_separator(ch) {
			pending_sep = true;
			continue;
		}
		if pending_sep && !out.is_empty() {
			out.push('-');
		}
		pending_sep = false;
		out.extend(ch.to_lowercase());
	}
	out
}

fn is_separator(ch: char) -> bool {
	matches!(ch, '.' | '_' | '-') || ch.is_whitespace()
}

/// Splits a Rust type name on case boundaries so it normalizes into separate segments.
///
/// `GeneratePatientService` becomes `Generate Patient Service`, `HTTPService` becomes
/// `HTTP Service`.
pub(crate) fn split_camel(raw: &str) -> String {
	let chars: Vec<char> = raw.chars().collect();
	let mut out = String::with_capacity(raw.len() + 8);
	for (i, &ch) in chars.iter().enumerate() {
		if i > 0 && ch.is_uppercase() {
			let prev = chars[i - 1];
			let next_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
			if prev.is_lowercase() || prev.is_numeric() || (prev.is_uppercase() && next_lower) {
				out.push(' ');
			}
		}
		out.push(ch);
	}
	out
}

/// Normalizes a segment, rejecting an empty result or stray punctuation.
pub(crate) fn segment(field: IdentityField, raw: &str) -> Result<String, IdentityError> {
	let token = normalize_token(raw);
	if token.is_empty() {
		return Err(IdentityError::EmptyToken {
			field,
			raw: raw.to_string(),
		});
	}
	if let Some(ch) = token.chars().find(|&c| (c.is_ascii_punctuation() && c != '-') || c.is_control()) {
		return Err(IdentityError::InvalidCharacter {
			field,
			raw: raw.to_string(),
			ch,
		});
	}
	Ok(token)
}

/// Immutable four-part component address.
///
/// Serializes as its label so deserialized values go through the same normalization.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity {
	domain: Domain,
	namespace: String,
	group: String,
	name: String,
}

impl Identity {
	/// Builds an identity, normalizing every segment.
	pub fn new(domain: Domain, namespace: &str, group: &str, name: &str) -> Result<Self, IdentityError> {
		Ok(Self {
			domain,
			namespace: segment(IdentityField::Namespace, namespace)?,
			group: segment(IdentityField::Group, group)?,
			name: segment(IdentityField::Name, name)?,
		})
	}

	/// Parses a `domain.namespace.group.name` label.
	pub fn parse(label: &str) -> Result<Self, IdentityError> {
		let parts: Vec<&str> = label.split('.').collect();
		let [domain, namespace, group, name] = parts.as_slice() else {
			return Err(IdentityError::MalformedLabel { label: label.to_string() });
		};
		Self::new(Domain::parse(domain)?, namespace, group, name)
	}

	pub fn domain(&self) -> Domain {
		self.domain
	}

	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	pub fn group(&self) -> &str {
		&self.group
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Returns the canonical dot-joined label.
	pub fn label(&self) -> String {
		self.to_string()
	}
}

impl fmt::Display for Identity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}.{}.{}", self.domain, self.namespace, self.group, self.name)
	}
}

impl FromStr for Identity {
	type Err = IdentityError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

impl TryFrom<String> for Identity {
	type Error = IdentityError;

	fn try_from(label: String) -> Result<Self, Self::Error> {
		Self::parse(&label)
	}
}

impl From<Identity> for String {
	fn from(id: Identity) -> Self {
		id.label()
	}
}

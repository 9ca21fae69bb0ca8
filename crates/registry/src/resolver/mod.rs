//! Identity derivation from hints, declarations and host context.
//!
//! # Role
//!
//! [`IdentityResolver::resolve`] turns a [`ComponentDecl`] plus caller hints into an
//! [`Identity`]. Each field takes the first non-empty value from:
//!
//! 1. explicit caller hint
//! 2. component-declared attribute
//! 3. host-derived default (application label, then crate segment for namespaces)
//! 4. domain default
//!
//! # Name derivation
//!
//! Names that were not passed explicitly (declared names and names derived from the Rust
//! type) are split into segments and have strip tokens removed from both ends until
//! nothing more matches. Strip tokens match whole segments only; a compound token such as
//! `prompt-section` matches a run of segments.
//!
//! # Invariants
//!
//! - Resolution is memoized per component type. The first successful resolution wins and
//!   later calls return it regardless of hints.
//! - Explicit names are never stripped.

use std::any::TypeId;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::component::ComponentDecl;
use crate::error::{IdentityError, IdentityField};
use crate::identity::{Domain, Identity, normalize_token, segment, split_camel};

#[cfg(test)]
mod tests;

/// Fallback namespace and group when nothing else supplies one.
pub const DEFAULT_SEGMENT: &str = "default";

/// Strip tokens applied when no configuration supplies any.
pub const BUILTIN_STRIP_TOKENS: &[&str] = &["service", "codec", "schema", "section", "prompt-section", "provider", "backend", "handler"];

/// Caller-supplied identity hints. These take precedence over everything else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityHints {
	pub domain: Option<Domain>,
	pub namespace: Option<String>,
	pub group: Option<String>,
	pub name: Option<String>,
}

impl IdentityHints {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn domain(mut self, domain: Domain) -> Self {
		self.domain = Some(domain);
		self
	}

	pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
		self.namespace = Some(namespace.into());
		self
	}

	pub fn group(mut self, group: impl Into<String>) -> Self {
		self.group = Some(group.into());
		self
	}

	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}
}

/// Ordered strip-token sets, stored as normalized segment runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripTokens {
	global: Vec<Vec<String>>,
	by_namespace: FxHashMap<String, Vec<Vec<String>>>,
}

impl Default for StripTokens {
	fn default() -> Self {
		Self::builtin()
	}
}

impl StripTokens {
	/// No tokens at all.
	pub fn empty() -> Self {
		Self {
			global: Vec::new(),
			by_namespace: FxHashMap::default(),
		}
	}

	/// The built-in defaults.
	pub fn builtin() -> Self {
		let mut tokens = Self::empty();
		tokens.extend_global(BUILTIN_STRIP_TOKENS.iter().copied());
		tokens
	}

	fn to_segments(raw: &str) -> Option<Vec<String>> {
		let token = normalize_token(raw);
		(!token.is_empty()).then(|| token.split('-').map(str::to_string).collect())
	}

	/// Adds process-wide tokens (environment or config file).
	pub fn extend_global<I, S>(&mut self, tokens: I)
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		for raw in tokens {
			if let Some(segs) = Self::to_segments(raw.as_ref())
				&& !self.global.contains(&segs)
			{
				self.global.push(segs);
			}
		}
	}

	/// Adds host-contributed tokens that only apply inside `namespace`.
	pub fn extend_namespace<I, S>(&mut self, namespace: &str, tokens: I)
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let entry = self.by_namespace.entry(normalize_token(namespace)).or_default();
		for raw in tokens {
			if let Some(segs) = Self::to_segments(raw.as_ref())
				&& !entry.contains(&segs)
			{
				entry.push(segs);
			}
		}
	}

	fn for_namespace<'a>(&'a self, namespace: &str) -> impl Iterator<Item = &'a [String]> + 'a {
		let scoped = self.by_namespace.get(namespace).into_iter().flatten();
		self.global.iter().chain(scoped).map(Vec::as_slice)
	}

	/// Strips matching edge runs from `segs` until a fixed point.
	///
	/// Returns the removed tokens in removal order.
	pub fn strip(&self, namespace: &str, segs: &mut Vec<String>) -> Vec<String> {
		let mut removed = Vec::new();
		loop {
			let mut changed = false;
			for token in self.for_namespace(namespace) {
				if segs.len() >= token.len() && segs[..token.len()] == *token {
					segs.drain(..token.len());
					removed.push(token.join("-"));
					changed = true;
				}
				if segs.len() >= token.len() && segs[segs.len() - token.len()..] == *token {
					segs.truncate(segs.len() - token.len());
					removed.push(token.join("-"));
					changed = true;
				}
			}
			if !changed {
				return removed;
			}
		}
	}
}

/// Host-supplied defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostContext {
	/// Owning application label; preferred over the crate segment for namespaces.
	pub app_label: Option<String>,
	/// Group used when neither hint nor declaration sets one.
	pub group: Option<String>,
	/// Domain used when neither hint nor declaration sets one.
	pub default_domain: Option<Domain>,
}

/// Which precedence level supplied a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
	Explicit,
	Declared,
	Host,
	Default,
}

/// How an identity was derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionMeta {
	pub domain: FieldSource,
	pub namespace: FieldSource,
	pub group: FieldSource,
	pub name: FieldSource,
	/// Strip tokens removed from the name, in removal order.
	pub stripped: Vec<String>,
}

/// A resolved identity together with its derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
	pub identity: Identity,
	pub meta: ResolutionMeta,
}

/// Memoizing identity resolver.
#[derive(Debug, Default)]
pub struct IdentityResolver {
	host: HostContext,
	strip: StripTokens,
	cache: Mutex<FxHashMap<TypeId, Resolved>>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
	value.filter(|v| !normalize_token(v).is_empty())
}

fn pick<'a>(candidates: [(Option<&'a str>, FieldSource); 4]) -> (&'a str, FieldSource) {
	candidates
		.into_iter()
		.find_map(|(value, source)| non_empty(value).map(|v| (v, source)))
		.unwrap_or((DEFAULT_SEGMENT, FieldSource::Default))
}

impl IdentityResolver {
	pub fn new(host: HostContext, strip: StripTokens) -> Self {
		Self {
			host,
			strip,
			cache: Mutex::new(FxHashMap::default()),
		}
	}

	pub fn host(&self) -> &HostContext {
		&self.host
	}

	pub fn strip_tokens(&self) -> &StripTokens {
		&self.strip
	}

	/// Resolves and memoizes the identity for the declared component type.
	///
	/// The cache lock is held while deriving, so concurrent first resolutions of one type
	/// compute exactly once.
	pub fn resolve(&self, decl: &ComponentDecl, hints: &IdentityHints) -> Result<Resolved, IdentityError> {
		let mut cache = self.cache.lock();
		if let Some(hit) = cache.get(&decl.type_id) {
			return Ok(hit.clone());
		}
		let resolved = self.derive(decl, hints)?;
		tracing::trace!(identity = %resolved.identity, type_name = decl.type_name, "identity.resolved");
		cache.insert(decl.type_id, resolved.clone());
		Ok(resolved)
	}

	/// Returns the memoized resolution for a type, if any.
	pub fn cached(&self, type_id: TypeId) -> Option<Resolved> {
		self.cache.lock().get(&type_id).cloned()
	}

	/// Pure derivation without memoization.
	pub fn derive(&self, decl: &ComponentDecl, hints: &IdentityHints) -> Result<Resolved, IdentityError> {
		let (domain, domain_src) = if let Some(d) = hints.domain {
			(d, FieldSource::Explicit)
		} else if let Some(d) = decl.domain {
			(d, FieldSource::Declared)
		} else if let Some(d) = self.host.default_domain {
			(d, FieldSource::Host)
		} else {
			return Err(IdentityError::MissingDomain { type_name: decl.type_name });
		};

		let host_namespace = non_empty(self.host.app_label.as_deref()).or_else(|| non_empty(Some(decl.crate_segment())));
		let (namespace_raw, namespace_src) = pick([
			(hints.namespace.as_deref(), FieldSource::Explicit),
			(decl.namespace.as_deref(), FieldSource::Declared),
			(host_namespace, FieldSource::Host),
			(None, FieldSource::Default),
		]);
		let namespace = segment(IdentityField::Namespace, namespace_raw)?;

		let (group_raw, group_src) = pick([
			(hints.group.as_deref(), FieldSource::Explicit),
			(decl.group.as_deref(), FieldSource::Declared),
			(self.host.group.as_deref(), FieldSource::Host),
			(None, FieldSource::Default),
		]);

		let (name, name_src, stripped) = match non_empty(hints.name.as_deref()) {
			Some(explicit) => (segment(IdentityField::Name, explicit)?, FieldSource::Explicit, Vec::new()),
			None => {
				let (raw, src) = match non_empty(decl.name.as_deref()) {
					Some(declared) => (declared.to_string(), FieldSource::Declared),
					None => (split_camel(decl.short_name()), FieldSource::Host),
				};
				let token = normalize_token(&raw);
				let mut segs: Vec<String> = token.split('-').filter(|s| !s.is_empty()).map(str::to_string).collect();
				let stripped = self.strip.strip(&namespace, &mut segs);
				let name = segment(IdentityField::Name, &segs.join("-")).map_err(|_| IdentityError::EmptyToken {
					field: IdentityField::Name,
					raw,
				})?;
				(name, src, stripped)
			}
		};

		let identity = Identity::new(domain, &namespace, group_raw, &name)?;
		Ok(Resolved {
			identity,
			meta: ResolutionMeta {
				domain: domain_src,
				namespace: namespace_src,
				group: group_src,
				name: name_src,
				stripped,
			},
		})
	}
}

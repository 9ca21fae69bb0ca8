use pretty_assertions::assert_eq;

use super::*;

struct GeneratePatientService;
struct GradingFeedbackCodec;
struct ServiceService;

fn resolver_with(tokens: &[&str]) -> IdentityResolver {
	let mut strip = StripTokens::builtin();
	strip.extend_global(tokens.iter().copied());
	IdentityResolver::new(HostContext::default(), strip)
}

/// Declared name, strip tokens and an explicit namespace hint combine into the expected label.
#[test]
fn test_declared_name_is_stripped_under_hinted_namespace() {
	let resolver = resolver_with(&["Generate", "Service"]);
	let decl = ComponentDecl::of::<GeneratePatientService>()
		.domain(Domain::Services)
		.name("Generate Patient Service");
	let hints = IdentityHints::new().namespace("TeleMed");

	let resolved = resolver.resolve(&decl, &hints).unwrap();
	assert_eq!(resolved.identity.label(), "services.telemed.default.patient");
	assert_eq!(resolved.meta.namespace, FieldSource::Explicit);
	assert_eq!(resolved.meta.name, FieldSource::Declared);
	assert_eq!(resolved.meta.stripped, vec!["service".to_string(), "generate".to_string()]);
}

/// Explicit name hints keep every segment.
#[test]
fn test_explicit_name_is_never_stripped() {
	let resolver = resolver_with(&["generate"]);
	let decl = ComponentDecl::of::<GeneratePatientService>().domain(Domain::Services);
	let hints = IdentityHints::new().name("Generate Patient Service");

	let resolved = resolver.derive(&decl, &hints).unwrap();
	assert_eq!(resolved.identity.name(), "generate-patient-service");
	assert!(resolved.meta.stripped.is_empty());
}

/// Names derived from the Rust type are split on case and stripped.
#[test]
fn test_type_name_derivation() {
	let resolver = resolver_with(&[]);
	let decl = ComponentDecl::of::<GradingFeedbackCodec>().domain(Domain::Codecs);

	let resolved = resolver.derive(&decl, &IdentityHints::new()).unwrap();
	assert_eq!(resolved.identity.name(), "grading-feedback");
	assert_eq!(resolved.identity.namespace(), "switchboard-registry");
	assert_eq!(resolved.meta.namespace, FieldSource::Host);
}

/// Stripping repeats until no edge token matches.
#[test]
fn test_strip_is_iterative() {
	let mut strip = StripTokens::empty();
	strip.extend_global(["v2", "service"]);
	let mut segs: Vec<String> = ["service", "v2", "patient", "service", "v2"].iter().map(|s| s.to_string()).collect();
	strip.strip("app", &mut segs);
	assert_eq!(segs, vec!["patient".to_string()]);
}

/// Compound tokens match whole segment runs, never partial segments.
#[test]
fn test_strip_matches_whole_segments() {
	let mut strip = StripTokens::empty();
	strip.extend_global(["prompt-section", "ice"]);
	let mut segs: Vec<String> = ["intro", "prompt", "section"].iter().map(|s| s.to_string()).collect();
	strip.strip("app", &mut segs);
	assert_eq!(segs, vec!["intro".to_string()]);

	let mut segs: Vec<String> = ["notice"].iter().map(|s| s.to_string()).collect();
	strip.strip("app", &mut segs);
	assert_eq!(segs, vec!["notice".to_string()]);
}

/// Namespace-scoped tokens only apply inside their namespace.
#[test]
fn test_namespace_scoped_tokens() {
	let mut strip = StripTokens::empty();
	strip.extend_namespace("TeleMed", ["patient"]);

	let mut inside: Vec<String> = vec!["patient".into(), "chat".into()];
	strip.strip("telemed", &mut inside);
	assert_eq!(inside, vec!["chat".to_string()]);

	let mut outside: Vec<String> = vec!["patient".into(), "chat".into()];
	strip.strip("other", &mut outside);
	assert_eq!(outside.len(), 2);
}

/// The application label wins over the crate segment for namespaces.
#[test]
fn test_app_label_preferred_for_namespace() {
	let host = HostContext {
		app_label: Some("ChatLab".into()),
		group: Some("sim".into()),
		default_domain: Some(Domain::Services),
	};
	let resolver = IdentityResolver::new(host, StripTokens::builtin());
	let decl = ComponentDecl::of::<GeneratePatientService>();

	let resolved = resolver.derive(&decl, &IdentityHints::new()).unwrap();
	assert_eq!(resolved.identity.label(), "services.chatlab.sim.generate-patient");
	assert_eq!(resolved.meta.domain, FieldSource::Host);
	assert_eq!(resolved.meta.group, FieldSource::Host);
}

/// Missing domain and fully stripped names are hard errors.
#[test]
fn test_resolution_failures() {
	let resolver = resolver_with(&[]);
	let decl = ComponentDecl::of::<GeneratePatientService>();
	assert!(matches!(resolver.derive(&decl, &IdentityHints::new()), Err(IdentityError::MissingDomain { .. })));

	let decl = ComponentDecl::of::<ServiceService>().domain(Domain::Services);
	assert!(matches!(
		resolver.derive(&decl, &IdentityHints::new()),
		Err(IdentityError::EmptyToken {
			field: IdentityField::Name,
			..
		})
	));

	let decl = ComponentDecl::of::<GeneratePatientService>().domain(Domain::Services);
	let hints = IdentityHints::new().namespace("__ ..").name("x");
	// A hint that normalizes to nothing falls through to the host default.
	let resolved = resolver.derive(&decl, &hints).unwrap();
	assert_eq!(resolved.identity.namespace(), "switchboard-registry");

	let hints = IdentityHints::new().namespace("!!!").name("x");
	assert!(matches!(
		resolver.derive(&decl, &hints),
		Err(IdentityError::InvalidCharacter {
			field: IdentityField::Namespace,
			ch: '!',
			..
		})
	));
}

/// The first successful resolution is cached and later hints are ignored.
#[test]
fn test_resolution_is_memoized() {
	let resolver = resolver_with(&[]);
	let decl = ComponentDecl::of::<GeneratePatientService>().domain(Domain::Services);

	let first = resolver.resolve(&decl, &IdentityHints::new().namespace("a")).unwrap();
	let second = resolver.resolve(&decl, &IdentityHints::new().namespace("b")).unwrap();
	assert_eq!(first, second);
	assert_eq!(second.identity.namespace(), "a");
	assert_eq!(resolver.cached(decl.type_id), Some(first));
}

/// A failed resolution is not cached, so a corrected call can still succeed.
#[test]
fn test_failed_resolution_not_cached() {
	let resolver = resolver_with(&[]);
	let decl = ComponentDecl::of::<GeneratePatientService>();
	assert!(resolver.resolve(&decl, &IdentityHints::new()).is_err());

	let ok = resolver.resolve(&decl, &IdentityHints::new().domain(Domain::Services)).unwrap();
	assert_eq!(ok.identity.domain(), Domain::Services);
}

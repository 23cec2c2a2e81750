//! Pure body-patching functions.
//!
//! Regex-based code patching is fragile against changes in target code
//! shape, so it is isolated here as pure `(body, pattern) -> outcome`
//! functions with no protocol dependency. The controller composes these;
//! the tests exercise them directly.

use regex::Regex;
use time::OffsetDateTime;
use time::macros::format_description;

/// Result of applying the detection pattern to one intercepted body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
	/// The bootstrap assignment was found; `body` carries the alias
	/// statement. Re-applying to an already-patched body returns it
	/// unchanged.
	Patched {
		body: String,
		/// Name of the bootstrap variable the alias binds to.
		ident: String,
	},
	/// Nothing matched. Expected for most intercepted resources; the body
	/// must be released unmodified.
	NoMatch,
}

/// The alias statement binding the well-known global to the bootstrap
/// variable.
pub fn alias_statement(alias: &str, ident: &str) -> String {
	format!("window.{alias}={ident};")
}

/// Applies `detect` to `body` and splices the alias statement in
/// immediately after the first match.
///
/// Only the first match is used; each body is patched independently. The
/// operation is idempotent: if the body already contains the alias
/// statement, it comes back byte-identical.
pub fn patch_body(body: &str, detect: &Regex, alias: &str) -> PatchOutcome {
	let Some(found) = detect.find(body) else {
		return PatchOutcome::NoMatch;
	};

	let ident = leading_ident(found.as_str());
	if ident.is_empty() {
		return PatchOutcome::NoMatch;
	}

	let statement = alias_statement(alias, ident);
	if body.contains(&statement) {
		return PatchOutcome::Patched {
			body: body.to_string(),
			ident: ident.to_string(),
		};
	}

	let mut patched = String::with_capacity(body.len() + statement.len());
	patched.push_str(&body[..found.end()]);
	patched.push_str(&statement);
	patched.push_str(&body[found.end()..]);

	PatchOutcome::Patched {
		body: patched,
		ident: ident.to_string(),
	}
}

/// Leading identifier token of a matched slice (the bootstrap variable).
fn leading_ident(text: &str) -> &str {
	let end = text
		.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '$'))
		.unwrap_or(text.len());
	&text[..end]
}

/// Reassembles a complete HTTP response around a patched body.
///
/// `Content-Length` is the byte length of the body, which is what the
/// target's network stack trusts when consuming the replacement.
pub fn assemble_response(body: &str, content_type: &str) -> String {
	format!(
		"HTTP/1.1 200 OK\r\nDate: {}\r\nConnection: closed\r\nContent-Length: {}\r\nContent-Type: {}\r\n\r\n{}",
		http_date(OffsetDateTime::now_utc()),
		body.len(),
		content_type,
		body
	)
}

/// RFC 7231 IMF-fixdate.
fn http_date(now: OffsetDateTime) -> String {
	let fmt = format_description!(
		"[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
	);
	now.format(&fmt)
		.unwrap_or_else(|_| "Thu, 01 Jan 1970 00:00:00 GMT".to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn detect() -> Regex {
		Regex::new(r"\w+\.ApplicationMain\s*=").unwrap()
	}

	#[test]
	fn single_match_gets_one_alias_after_the_match() {
		let body = "X.ApplicationMain = function(){ /*...*/ };";
		let PatchOutcome::Patched { body: patched, ident } =
			patch_body(body, &detect(), "__handle__")
		else {
			panic!("expected a patch");
		};

		assert_eq!(ident, "X");
		// Alias lands immediately after the matched assignment head, with
		// the remainder of the original body unchanged behind it.
		assert!(patched.starts_with("X.ApplicationMain =window.__handle__=X;"));
		assert!(patched.ends_with(" function(){ /*...*/ };"));
		assert_eq!(patched.matches("window.__handle__=X;").count(), 1);
	}

	#[test]
	fn no_match_returns_no_match() {
		let body = "var analytics = {};";
		assert_eq!(patch_body(body, &detect(), "__handle__"), PatchOutcome::NoMatch);
	}

	#[test]
	fn reapplying_never_accumulates_aliases() {
		let body = "X.ApplicationMain = function(){};";
		let PatchOutcome::Patched { body: once, .. } = patch_body(body, &detect(), "__handle__")
		else {
			panic!("expected a patch");
		};
		let PatchOutcome::Patched { body: twice, .. } = patch_body(&once, &detect(), "__handle__")
		else {
			panic!("expected a patch");
		};

		assert_eq!(once, twice);
		assert_eq!(twice.matches("window.__handle__=X;").count(), 1);
	}

	#[test]
	fn only_the_first_of_multiple_matches_is_used() {
		let body = "A.ApplicationMain = f; B.ApplicationMain = g;";
		let PatchOutcome::Patched { body: patched, ident } =
			patch_body(body, &detect(), "__handle__")
		else {
			panic!("expected a patch");
		};

		assert_eq!(ident, "A");
		assert_eq!(patched.matches("window.__handle__=").count(), 1);
		assert!(patched.contains("A.ApplicationMain =window.__handle__=A;"));
		assert!(patched.contains("B.ApplicationMain = g;"));
	}

	#[test]
	fn dollar_identifiers_are_extracted_whole() {
		let body = "$app2.ApplicationMain = start();";
		let detect = Regex::new(r"[\w$]+\.ApplicationMain\s*=").unwrap();
		let PatchOutcome::Patched { ident, .. } = patch_body(body, &detect, "__handle__") else {
			panic!("expected a patch");
		};
		assert_eq!(ident, "$app2");
	}

	#[test]
	fn assembled_response_declares_actual_byte_length() {
		// Multibyte content makes char-count vs byte-count mistakes visible.
		let body = "var s = \"caf\u{e9} \u{2603}\";";
		let response = assemble_response(body, "application/javascript");

		assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
		assert!(response.contains("\r\nConnection: closed\r\n"));
		assert!(response.contains("\r\nContent-Type: application/javascript\r\n"));

		let (head, payload) = response.split_once("\r\n\r\n").unwrap();
		assert_eq!(payload, body);

		let declared: usize = head
			.lines()
			.find_map(|l| l.strip_prefix("Content-Length: "))
			.unwrap()
			.parse()
			.unwrap();
		assert_eq!(declared, payload.len());
		assert_ne!(payload.chars().count(), payload.len());
	}

	#[test]
	fn http_date_is_imf_fixdate() {
		let epoch = OffsetDateTime::UNIX_EPOCH;
		assert_eq!(http_date(epoch), "Thu, 01 Jan 1970 00:00:00 GMT");
	}
}

//! Identifier quoting, qualification and name validation.
//!
//! Mapping fragments name tables, columns and classes in several forms:
//! back-tick quoted (`` `Order` ``), ANSI quoted (`"Order"`), package
//! qualified (`org.shop.Order`) or bare. These helpers reduce them to the
//! canonical forms the repository keys on.

use regex::Regex;
use std::sync::OnceLock;

fn backtick_quoted() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^`(?P<name>[^`]+)`$").expect("static regex"))
}

fn ansi_quoted() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^"(?P<name>(?:[^"]|"")+)"$"#).expect("static regex"))
}

fn entity_name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[\p{L}_$][\w$]*(\.[\p{L}_$][\w$]*)*$").expect("static regex")
    })
}

fn role_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^.\s]+(\.[^.\s]+)+$").expect("static regex"))
}

/// Quote a SQL identifier using ANSI double-quoting.
///
/// Embedded double-quotes are escaped by doubling them (`"` → `""`).
///
/// ```
/// use ormbind_core::naming::quote_ident;
///
/// assert_eq!(quote_ident("users"), "\"users\"");
/// assert_eq!(quote_ident("user\"name"), "\"user\"\"name\"");
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Is this identifier already in quoted form (back-tick or ANSI)?
pub fn is_quoted(name: &str) -> bool {
    backtick_quoted().is_match(name) || ansi_quoted().is_match(name)
}

/// Strip quoting from an identifier, undoing `""` escapes.
pub fn unquote(name: &str) -> String {
    if let Some(caps) = backtick_quoted().captures(name) {
        return caps["name"].to_string();
    }
    if let Some(caps) = ansi_quoted().captures(name) {
        return caps["name"].replace("\"\"", "\"");
    }
    name.to_string()
}

/// Normalize the quoting of a table or column identifier.
///
/// Back-tick quoting is rewritten to ANSI quoting; ANSI-quoted names are kept
/// as they are; bare names are quoted only when `globally_quoted` is set.
///
/// ```
/// use ormbind_core::naming::normalize_identifier_quoting;
///
/// assert_eq!(normalize_identifier_quoting("`Order`", false), "\"Order\"");
/// assert_eq!(normalize_identifier_quoting("orders", false), "orders");
/// assert_eq!(normalize_identifier_quoting("orders", true), "\"orders\"");
/// ```
pub fn normalize_identifier_quoting(name: &str, globally_quoted: bool) -> String {
    if ansi_quoted().is_match(name) {
        return name.to_string();
    }
    if let Some(caps) = backtick_quoted().captures(name) {
        return quote_ident(&caps["name"]);
    }
    if globally_quoted && !name.is_empty() {
        return quote_ident(name);
    }
    name.to_string()
}

/// Build the qualified key of a table: `catalog.schema.name`, skipping the
/// parts that are absent.
pub fn qualify_table(catalog: Option<&str>, schema: Option<&str>, name: &str) -> String {
    let mut qualified = String::new();
    if let Some(catalog) = catalog {
        qualified.push_str(catalog);
        qualified.push('.');
    }
    if let Some(schema) = schema {
        qualified.push_str(schema);
        qualified.push('.');
    }
    qualified.push_str(name);
    qualified
}

/// Qualify a class name with the mapping package when the name carries no
/// package of its own.
///
/// ```
/// use ormbind_core::naming::qualify_class_name;
///
/// assert_eq!(qualify_class_name("Cat", Some("org.zoo")), "org.zoo.Cat");
/// assert_eq!(qualify_class_name("org.farm.Cow", Some("org.zoo")), "org.farm.Cow");
/// assert_eq!(qualify_class_name("Cat", None), "Cat");
/// ```
pub fn qualify_class_name(unqualified: &str, package: Option<&str>) -> String {
    match package {
        Some(package) if !unqualified.contains('.') && !package.is_empty() => {
            format!("{}.{}", package, unqualified)
        }
        _ => unqualified.to_string(),
    }
}

/// The part of a qualified name after its last dot.
pub fn unqualify(qualified: &str) -> &str {
    qualified.rsplit('.').next().unwrap_or(qualified)
}

/// Build a collection role from its owner entity and property.
pub fn collection_role(owner: &str, property: &str) -> String {
    format!("{}.{}", owner, property)
}

/// Does this look like an entity or class name?
pub fn is_valid_entity_name(name: &str) -> bool {
    entity_name_pattern().is_match(name)
}

/// Does this look like a collection role (`Owner.property`)?
pub fn is_valid_role(role: &str) -> bool {
    role_pattern().is_match(role)
}

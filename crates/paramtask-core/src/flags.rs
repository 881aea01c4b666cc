//! Flag decoding: turns flag tokens into typed parameter values

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use crate::error::{ParamError, Result};
use crate::params::{ParamBag, ParamValue};

/// Signed decimal or scientific literal; such tokens are never flags
static NUMBER_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-+]?(?:\d+(?:\.\d*)?|\.\d+)(e[-+]?\d+)?$").expect("Invalid regex")
});

/// Values that are coerced to numbers when no type is declared
static NUMERIC_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?(?:\d+(?:\.\d*)?|\.\d+)(e[-+]?\d+)?$").expect("Invalid regex")
});

static HEX_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^0x[0-9a-f]+$").expect("Invalid regex"));

/// Largest integer a double represents exactly
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Check whether a token is a number literal (`-1`, `+2.5`, `-1e-9`)
pub fn is_number(token: &str) -> bool {
    NUMBER_LITERAL.is_match(token)
}

/// Check whether a token is a flag (starts with `-` and is not a number)
pub fn is_flag(token: &str) -> bool {
    token.starts_with('-') && !is_number(token)
}

/// Check whether a token is a flag carrying an inline value (`--a=1`, `-a=1`)
pub fn is_flag_with_value(token: &str) -> bool {
    token.starts_with('-') && token.contains('=')
}

/// Declared aliases, type coercions and constraints for flags
#[derive(Debug, Clone, Default)]
pub struct FlagOptions {
    alias_groups: Vec<BTreeSet<String>>,
    numbers: HashSet<String>,
    strings: HashSet<String>,
    choices: HashMap<String, Vec<String>>,
    normalize: HashSet<String>,
}

impl FlagOptions {
    /// Create options with no declarations
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare aliases of a flag; setting any of them sets all of them
    pub fn alias<I, S>(mut self, name: impl Into<String>, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut group: BTreeSet<String> = aliases.into_iter().map(Into::into).collect();
        group.insert(name.into());

        // Groups sharing a member collapse into one
        let (overlapping, mut rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.alias_groups)
            .into_iter()
            .partition(|existing| !existing.is_disjoint(&group));
        for existing in overlapping {
            group.extend(existing);
        }
        rest.push(group);
        self.alias_groups = rest;
        self
    }

    /// Force the given flags to be parsed as numbers
    pub fn number<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.numbers.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Force the given flags to keep their raw string value
    pub fn string<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.strings.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Restrict a flag to a set of values
    pub fn choices<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices
            .entry(key.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Normalize the path value of the given flags
    pub fn normalize<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.normalize.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Every name a value for `key` is stored under: its aliases and their
    /// camel-case forms
    pub fn expand_key(&self, key: &str) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        let mut pending = vec![key.to_string()];

        while let Some(next) = pending.pop() {
            if !keys.insert(next.clone()) {
                continue;
            }
            if next.contains('-') {
                pending.push(camel_case(&next));
            }
            for group in &self.alias_groups {
                if group.contains(&next) {
                    pending.extend(group.iter().cloned());
                }
            }
        }

        keys
    }

    fn any_declared(&self, keys: &BTreeSet<String>, declared: &HashSet<String>) -> bool {
        keys.iter().any(|k| declared.contains(k))
    }

    /// Value stored for a flag that received `raw` as its value
    fn value_for(&self, keys: &BTreeSet<String>, raw: &str) -> ParamValue {
        let value = if self.any_declared(keys, &self.strings) {
            ParamValue::Str(raw.to_string())
        } else if self.any_declared(keys, &self.numbers) {
            ParamValue::Num(coerce_number(raw))
        } else if looks_numeric(raw) {
            ParamValue::Num(coerce_number(raw))
        } else {
            ParamValue::Str(raw.to_string())
        };

        match value {
            ParamValue::Str(s) if self.any_declared(keys, &self.normalize) => {
                ParamValue::Str(normalize_path(&s))
            }
            other => other,
        }
    }

    /// Value stored for a flag given without a value, `None` to leave it unset
    fn bare_value_for(&self, keys: &BTreeSet<String>) -> Option<ParamValue> {
        if self.any_declared(keys, &self.strings) {
            Some(ParamValue::Str(String::new()))
        } else if self.any_declared(keys, &self.numbers) {
            None
        } else {
            Some(ParamValue::Bool(true))
        }
    }

    fn check_choices(&self, params: &ParamBag) -> Result<()> {
        for (key, allowed) in &self.choices {
            let Some(value) = params.get(key) else {
                continue;
            };
            let given = value.to_string();
            if !allowed.contains(&given) {
                return Err(ParamError::InvalidChoice {
                    key: key.clone(),
                    given,
                    choices: allowed.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Result of decoding one bucket of tokens
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    /// Flag values by name
    pub params: ParamBag,
    /// Tokens that were neither flags nor flag values
    pub positionals: Vec<String>,
}

/// Cursor-driven decoder over one token sequence
pub struct FlagDecoder<'a> {
    tokens: &'a [String],
    cursor: usize,
    options: &'a FlagOptions,
    decoded: Decoded,
}

impl<'a> FlagDecoder<'a> {
    /// Create a decoder positioned at the first token
    pub fn new(tokens: &'a [String], options: &'a FlagOptions) -> Self {
        Self {
            tokens,
            cursor: 0,
            options,
            decoded: Decoded::default(),
        }
    }

    /// Decode every token and validate declared choices
    pub fn decode(mut self) -> Result<Decoded> {
        while self.step() {}
        self.options.check_choices(&self.decoded.params)?;
        Ok(self.decoded)
    }

    /// Decode the token under the cursor; returns false once exhausted
    pub fn step(&mut self) -> bool {
        let tokens = self.tokens;
        let Some(token) = tokens.get(self.cursor) else {
            return false;
        };
        self.cursor += 1;
        trace!(token = %token, "decoding token");

        if token == "--" {
            let rest = &tokens[self.cursor..];
            self.decoded.positionals.extend(rest.iter().cloned());
            self.cursor = self.tokens.len();
        } else if let Some(body) = token.strip_prefix("--") {
            self.long_flag(body);
        } else if token.len() > 1 && is_flag(token) {
            self.short_flags(&token[1..]);
        } else {
            self.decoded.positionals.push(token.clone());
        }
        true
    }

    fn long_flag(&mut self, body: &str) {
        if let Some((key, value)) = body.split_once('=') {
            self.set(key, value);
        } else if let Some(negated) = body.strip_prefix("no-") {
            self.set_value(negated, ParamValue::Bool(false));
        } else if let Some(value) = self.take_value() {
            self.set(body, &value);
        } else {
            self.set_bare(body);
        }
    }

    /// `-abc`, `-abc value`, `-n5`, `-ab=value`, `-f/path`
    fn short_flags(&mut self, cluster: &str) {
        let chars: Vec<char> = cluster.chars().collect();
        let Some((&last, leading)) = chars.split_last() else {
            return;
        };

        for (j, &letter) in leading.iter().enumerate() {
            let following = chars[j + 1];
            let rest: String = chars[j + 1..].iter().collect();

            if following == '=' {
                let value: String = chars[j + 2..].iter().collect();
                self.set(&letter.to_string(), &value);
                return;
            }
            if letter.is_alphabetic() && is_number(&rest) {
                self.set(&letter.to_string(), &rest);
                return;
            }
            if !(following.is_alphanumeric() || following == '_') {
                self.set(&letter.to_string(), &rest);
                return;
            }
            self.set_bare(&letter.to_string());
        }

        if last == '-' {
            return;
        }
        let key = last.to_string();
        match self.take_value() {
            Some(value) => self.set(&key, &value),
            None => self.set_bare(&key),
        }
    }

    /// Consume the next token when it can serve as a flag value
    fn take_value(&mut self) -> Option<String> {
        let next = self.tokens.get(self.cursor)?;
        if next.starts_with('-') && !is_number(next) {
            return None;
        }
        self.cursor += 1;
        Some(next.clone())
    }

    fn set(&mut self, key: &str, raw: &str) {
        let keys = self.options.expand_key(key);
        let value = self.options.value_for(&keys, raw);
        self.store(&keys, value);
    }

    fn set_bare(&mut self, key: &str) {
        let keys = self.options.expand_key(key);
        if let Some(value) = self.options.bare_value_for(&keys) {
            self.store(&keys, value);
        }
    }

    fn set_value(&mut self, key: &str, value: ParamValue) {
        let keys = self.options.expand_key(key);
        self.store(&keys, value);
    }

    fn store(&mut self, keys: &BTreeSet<String>, value: ParamValue) {
        for key in keys {
            self.decoded.params.insert(key.clone(), value.clone());
        }
    }
}

/// Decode a token sequence with the given declarations
pub fn decode(tokens: &[String], options: &FlagOptions) -> Result<Decoded> {
    FlagDecoder::new(tokens, options).decode()
}

/// Whether an undeclared value should become a number
fn looks_numeric(raw: &str) -> bool {
    if HEX_VALUE.is_match(raw) {
        return true;
    }
    // Leading zeros mark identifiers like `007`, not numbers
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    if digits.len() > 1 && digits.starts_with('0') && !digits[1..].starts_with('.') {
        return false;
    }
    if !NUMERIC_VALUE.is_match(raw) {
        return false;
    }
    coerce_number(raw).floor().abs() <= MAX_SAFE_INTEGER
}

/// Numeric conversion with the usual scripting rules: whitespace trimmed,
/// empty is zero, hex/octal/binary prefixes honored, anything else is `NaN`
pub fn coerce_number(raw: &str) -> f64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    let lower = trimmed.to_ascii_lowercase();
    for (prefix, radix) in [("0x", 16), ("0o", 8), ("0b", 2)] {
        if let Some(digits) = lower.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix)
                .map(|n| n as f64)
                .unwrap_or(f64::NAN);
        }
    }

    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    let literal = trimmed.replace('E', "e");
    if is_number(&literal) {
        literal.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

/// Lexical path normalization: repeated separators collapse, `.` segments
/// drop, `..` segments resolve, a trailing separator is kept
pub fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let absolute = path.starts_with('/');
    let trailing = path.ends_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if !absolute => segments.push(".."),
                _ => {}
            },
            other => segments.push(other),
        }
    }

    let mut normalized = segments.join("/");
    if absolute {
        normalized.insert(0, '/');
    }
    if normalized.is_empty() {
        normalized.push('.');
    }
    if trailing && !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for c in key.trim_start_matches('-').chars() {
        if c == '-' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    fn decode_line(line: &str, options: &FlagOptions) -> ParamBag {
        decode(&tokens(line), options).unwrap().params
    }

    #[test]
    fn test_negative_numbers_are_not_flags() {
        assert!(!is_flag("-1"));
        assert!(!is_flag("-1.5"));
        assert!(!is_flag("-1e-9"));
        assert!(!is_flag("+3"));
        assert!(is_flag("-a"));
        assert!(is_flag("--param"));
    }

    #[test]
    fn test_long_flag_with_value() {
        let bag = decode_line("--param val", &FlagOptions::new());
        assert_eq!(bag, ParamBag::from([("param", "val")]));
    }

    #[test]
    fn test_long_flag_inline_value_splits_on_first_equals() {
        let bag = decode_line("--expr=a=b", &FlagOptions::new());
        assert_eq!(bag.get_str("expr"), Some("a=b"));
    }

    #[test]
    fn test_bare_long_flag_is_true() {
        let bag = decode_line("--param1 val --param2 --param3 val3", &FlagOptions::new());
        assert_eq!(bag.get_str("param1"), Some("val"));
        assert_eq!(bag.get("param2"), Some(&ParamValue::Bool(true)));
        assert_eq!(bag.get_str("param3"), Some("val3"));
    }

    #[test]
    fn test_negative_number_is_consumed_as_value() {
        let bag = decode_line("--offset -1.5", &FlagOptions::new());
        assert_eq!(bag.get("offset"), Some(&ParamValue::Num(-1.5)));
    }

    #[test]
    fn test_negation() {
        let bag = decode_line("--no-color", &FlagOptions::new());
        assert_eq!(bag.get("color"), Some(&ParamValue::Bool(false)));
    }

    #[test]
    fn test_short_cluster_last_letter_takes_value() {
        let bag = decode_line("-abc val", &FlagOptions::new());
        assert_eq!(
            bag,
            ParamBag::from([
                ("a", ParamValue::Bool(true)),
                ("b", ParamValue::Bool(true)),
                ("c", ParamValue::from("val")),
            ])
        );
    }

    #[test]
    fn test_short_cluster_followed_by_flag_is_all_true() {
        let bag = decode_line("-de -f", &FlagOptions::new());
        for key in ["d", "e", "f"] {
            assert_eq!(bag.get(key), Some(&ParamValue::Bool(true)), "key {key}");
        }
    }

    #[test]
    fn test_short_flag_attached_number() {
        let bag = decode_line("-n5", &FlagOptions::new());
        assert_eq!(bag.get("n"), Some(&ParamValue::Num(5.0)));
    }

    #[test]
    fn test_short_flag_inline_value() {
        let bag = decode_line("-ab=val", &FlagOptions::new());
        assert_eq!(bag.get("a"), Some(&ParamValue::Bool(true)));
        assert_eq!(bag.get_str("b"), Some("val"));
    }

    #[test]
    fn test_short_flag_attached_path() {
        let bag = decode_line("-f/tmp/out", &FlagOptions::new());
        assert_eq!(bag.get_str("f"), Some("/tmp/out"));
    }

    #[test]
    fn test_numeric_values_are_coerced() {
        let bag = decode_line("--a 1 --b 0x10 --c 007 --d 1e3", &FlagOptions::new());
        assert_eq!(bag.get("a"), Some(&ParamValue::Num(1.0)));
        assert_eq!(bag.get("b"), Some(&ParamValue::Num(16.0)));
        assert_eq!(bag.get_str("c"), Some("007"));
        assert_eq!(bag.get("d"), Some(&ParamValue::Num(1000.0)));
    }

    #[test]
    fn test_unsafe_integer_stays_string() {
        let bag = decode_line("--id 12345678901234567890", &FlagOptions::new());
        assert_eq!(bag.get_str("id"), Some("12345678901234567890"));
    }

    #[test]
    fn test_alias_sets_every_name() {
        let options = FlagOptions::new().alias("p", ["param"]);
        assert_eq!(
            decode_line("-p val", &options),
            ParamBag::from([("p", "val"), ("param", "val")])
        );
        assert_eq!(
            decode_line("--param val", &options),
            ParamBag::from([("p", "val"), ("param", "val")])
        );
    }

    #[test]
    fn test_alias_groups_merge() {
        let options = FlagOptions::new().alias("o", ["out"]).alias("out", ["output"]);
        let bag = decode_line("-o dist", &options);
        assert_eq!(bag.len(), 3);
        assert_eq!(bag.get_str("output"), Some("dist"));
    }

    #[test]
    fn test_camel_case_expansion() {
        let bag = decode_line("--dry-run", &FlagOptions::new());
        assert_eq!(bag.get("dry-run"), Some(&ParamValue::Bool(true)));
        assert_eq!(bag.get("dryRun"), Some(&ParamValue::Bool(true)));
    }

    #[test]
    fn test_number_coercion() {
        let options = FlagOptions::new().number(["p", "param"]);
        assert_eq!(decode_line("-p 1", &options).get("p"), Some(&ParamValue::Num(1.0)));
        assert_eq!(decode_line("-p -1", &options).get("p"), Some(&ParamValue::Num(-1.0)));
        assert_eq!(decode_line("-p 0x01", &options).get("p"), Some(&ParamValue::Num(1.0)));
        assert!(decode_line("-p val", &options).get("p").unwrap().is_nan());
    }

    #[test]
    fn test_number_flag_without_value_is_unset() {
        let options = FlagOptions::new().number(["p"]);
        assert!(decode_line("-p", &options).is_empty());
    }

    #[test]
    fn test_string_coercion() {
        let options = FlagOptions::new().string(["p", "param"]);
        assert_eq!(decode_line("-p 1", &options).get_str("p"), Some("1"));
        assert_eq!(decode_line("-p -1", &options).get_str("p"), Some("-1"));
        assert_eq!(decode_line("-p 0x01", &options).get_str("p"), Some("0x01"));
        assert_eq!(decode_line("-p val", &options).get_str("p"), Some("val"));
        assert_eq!(decode_line("-p", &options).get_str("p"), Some(""));
    }

    #[test]
    fn test_choices() {
        let options = FlagOptions::new().choices("p", ["v1", "v2"]);
        assert_eq!(decode_line("-p v2", &options).get_str("p"), Some("v2"));

        let err = decode(&tokens("-p v3"), &options).unwrap_err();
        assert!(matches!(err, ParamError::InvalidChoice { ref given, .. } if given == "v3"));
    }

    #[test]
    fn test_choices_ignore_absent_flag() {
        let options = FlagOptions::new().choices("p", ["v1"]);
        assert!(decode(&tokens("--other x"), &options).is_ok());
    }

    #[test]
    fn test_normalize() {
        let options = FlagOptions::new().normalize(["p"]);
        assert_eq!(decode_line("-p foo//bar", &options).get_str("p"), Some("foo/bar"));
    }

    #[test]
    fn test_double_dash_ends_flags() {
        let decoded = decode(&tokens("--a 1 -- --b c"), &FlagOptions::new()).unwrap();
        assert_eq!(decoded.params, ParamBag::from([("a", 1)]));
        assert_eq!(decoded.positionals, vec!["--b", "c"]);
    }

    #[test]
    fn test_last_occurrence_wins() {
        let bag = decode_line("--p a --p b", &FlagOptions::new());
        assert_eq!(bag.get_str("p"), Some("b"));
    }

    #[test]
    fn test_step_advances_cursor() {
        let toks = tokens("--a 1 --b");
        let options = FlagOptions::new();
        let mut decoder = FlagDecoder::new(&toks, &options);
        assert!(decoder.step());
        assert!(decoder.step());
        assert!(!decoder.step());
    }

    #[test]
    fn test_coerce_number() {
        assert_eq!(coerce_number("42"), 42.0);
        assert_eq!(coerce_number(" 1.5 "), 1.5);
        assert_eq!(coerce_number(""), 0.0);
        assert_eq!(coerce_number("0b101"), 5.0);
        assert!(coerce_number("inf").is_nan());
        assert!(coerce_number("nan").is_nan());
        assert!(coerce_number("12abc").is_nan());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("foo//bar"), "foo/bar");
        assert_eq!(normalize_path("/a/./b/../c/"), "/a/c/");
        assert_eq!(normalize_path("../x"), "../x");
        assert_eq!(normalize_path("/.."), "/");
        assert_eq!(normalize_path("./"), "./");
        assert_eq!(normalize_path(""), ".");
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("dry-run"), "dryRun");
        assert_eq!(camel_case("a-b-c"), "aBC");
    }
}

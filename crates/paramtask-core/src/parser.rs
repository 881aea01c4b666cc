//! Parameter parsing from strings, token lists and mappings

use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::error::{ParamError, Result};
use crate::flags::{self, FlagOptions};
use crate::params::{json_type_name, ParamBag, ParamSource, ParamValue, ParsedArgs};
use crate::split::split_into_tasks;

/// Split a flag string on runs of whitespace
pub fn tokenize(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

/// Parser turning any accepted parameter source into per-task bags
#[derive(Debug, Clone, Default)]
pub struct ParamsParser {
    options: FlagOptions,
}

impl ParamsParser {
    /// Create a parser with no flag declarations
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a parser with the given flag declarations
    pub fn with_options(options: FlagOptions) -> Self {
        Self { options }
    }

    /// Flag declarations in effect
    pub fn options(&self) -> &FlagOptions {
        &self.options
    }

    /// Declare aliases of a flag
    pub fn alias<I, S>(mut self, name: impl Into<String>, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = self.options.alias(name, aliases);
        self
    }

    /// Restrict a flag to a set of values
    pub fn choices<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = self.options.choices(key, values);
        self
    }

    /// Force flags to be parsed as numbers
    pub fn number<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = self.options.number(keys);
        self
    }

    /// Normalize the path value of flags
    pub fn normalize<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = self.options.normalize(keys);
        self
    }

    /// Force flags to keep their raw string value
    pub fn string<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = self.options.string(keys);
        self
    }

    /// Parse input into parameter bags keyed by task name.
    ///
    /// Mappings pass through (wrapped under the untargeted key when needed),
    /// token lists are split into task buckets and decoded, strings are
    /// tokenized on whitespace first.
    #[instrument(skip_all, fields(kind = input.kind()))]
    pub fn parse_source(&self, input: ParamSource) -> Result<ParsedArgs> {
        match input {
            ParamSource::Parsed(parsed) => Ok(parsed),
            ParamSource::Bag(bag) => Ok(ParsedArgs::untargeted_only(bag)),
            ParamSource::Line(line) => self.parse_tokens(&tokenize(&line)),
            ParamSource::Tokens(tokens) => self.parse_tokens(&tokens),
            ParamSource::Json(value) => self.parse_source(source_from_json(value)?),
        }
    }

    /// Parse any convertible input; see [`ParamsParser::parse_source`]
    pub fn parse(&self, input: impl Into<ParamSource>) -> Result<ParsedArgs> {
        self.parse_source(input.into())
    }

    /// Parse input as a single flat bag, without task splitting.
    ///
    /// Bare words are positionals and are dropped; an already-bucketed
    /// mapping contributes its untargeted bag.
    pub fn parse_params(&self, input: impl Into<ParamSource>) -> Result<ParamBag> {
        let bag = match input.into() {
            ParamSource::Bag(bag) => bag,
            ParamSource::Parsed(parsed) => parsed.untargeted().cloned().unwrap_or_default(),
            ParamSource::Line(line) => self.decode_bucket(&tokenize(&line))?,
            ParamSource::Tokens(tokens) => self.decode_bucket(&tokens)?,
            ParamSource::Json(value) => return self.parse_params(source_from_json(value)?),
        };
        Ok(bag.without_reserved())
    }

    fn parse_tokens(&self, tokens: &[String]) -> Result<ParsedArgs> {
        let buckets = split_into_tasks(tokens);
        debug!(buckets = buckets.len(), tokens = tokens.len(), "split tokens into task buckets");

        buckets
            .into_iter()
            .map(|(task, bucket)| -> Result<_> { Ok((task, self.decode_bucket(&bucket)?)) })
            .collect()
    }

    fn decode_bucket(&self, tokens: &[String]) -> Result<ParamBag> {
        let mut params = flags::decode(tokens, &self.options)?.params;
        params.strip_reserved();
        Ok(params)
    }
}

/// Parse with no flag declarations
pub fn parse(input: impl Into<ParamSource>) -> Result<ParsedArgs> {
    ParamsParser::new().parse(input)
}

/// Parse a single flat bag with no flag declarations
pub fn parse_params(input: impl Into<ParamSource>) -> Result<ParamBag> {
    ParamsParser::new().parse_params(input)
}

/// Validate a dynamically typed input and turn it into a typed source
fn source_from_json(value: Value) -> Result<ParamSource> {
    match value {
        Value::String(line) => Ok(ParamSource::Line(line)),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(token) => Ok(token),
                other => Err(unsupported(&other)),
            })
            .collect::<Result<Vec<_>>>()
            .map(ParamSource::Tokens),
        Value::Object(map) if matches!(map.get("null"), Some(Value::Object(_))) => map
            .into_iter()
            .map(|(key, bucket)| -> Result<_> {
                let task = (key != "null").then_some(key);
                match bucket {
                    Value::Object(bucket) => Ok((task, bag_from_json(bucket)?)),
                    other => Err(unsupported(&other)),
                }
            })
            .collect::<Result<ParsedArgs>>()
            .map(ParamSource::Parsed),
        Value::Object(map) => bag_from_json(map).map(ParamSource::Bag),
        other => Err(unsupported(&other)),
    }
}

fn bag_from_json(map: Map<String, Value>) -> Result<ParamBag> {
    let mut bag = ParamBag::new();
    for (key, value) in map {
        if value.is_null() {
            continue;
        }
        let value = ParamValue::from_json(&value).ok_or_else(|| unsupported(&value))?;
        bag.insert(key, value);
    }
    Ok(bag)
}

fn unsupported(value: &Value) -> ParamError {
    ParamError::UnsupportedInputType(json_type_name(value).to_string())
}

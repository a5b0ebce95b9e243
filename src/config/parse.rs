//! Secure deserialization of settings documents.
//!
//! Documents are parsed event by event so every scalar kind, tag and alias
//! can be checked before a value is materialized. The allow-list in
//! [`PermittedTypes`] is the only thing deciding which kinds of values a
//! document may produce.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use tracing::warn;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser, Tag};
use yaml_rust2::scanner::{Marker, ScanError, TScalarStyle};

use super::source::Source;
use super::value::{ConfigValue, Map, ScalarKind, Symbol};
use super::ConfigError;

const MERGE_KEY: &str = "<<";

/// Document syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Yaml,
    Toml,
}

/// Bounds on how large a document may grow while aliases are expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionLimits {
    /// Maximum number of materialized nodes, alias copies included.
    pub max_nodes: usize,
    /// Maximum collection nesting depth.
    pub max_depth: usize,
}

impl Default for ExpansionLimits {
    fn default() -> Self {
        Self {
            max_nodes: 100_000,
            max_depth: 512,
        }
    }
}

/// The allow-list of value kinds a document may contain.
///
/// The default permits every [`ScalarKind`] and no custom tags. Custom tags
/// are matched by their full text as written in the document, for example
/// `!ruby/object:Point`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermittedTypes {
    kinds: BTreeSet<ScalarKind>,
    tags: BTreeSet<String>,
    unrestricted: bool,
}

impl Default for PermittedTypes {
    fn default() -> Self {
        Self {
            kinds: ScalarKind::ALL.into_iter().collect(),
            tags: BTreeSet::new(),
            unrestricted: false,
        }
    }
}

impl PermittedTypes {
    /// Permits no scalar kinds at all; documents may only contain collections.
    pub fn none() -> Self {
        Self {
            kinds: BTreeSet::new(),
            tags: BTreeSet::new(),
            unrestricted: false,
        }
    }

    /// Disables the allow-list. Any tag is accepted and kept as
    /// [`ConfigValue::Tagged`]. Only use this for fully trusted documents.
    pub fn unrestricted() -> Self {
        Self {
            unrestricted: true,
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: ScalarKind) -> Self {
        self.kinds.insert(kind);
        self
    }

    pub fn without_kind(mut self, kind: ScalarKind) -> Self {
        self.kinds.remove(&kind);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn permits_kind(&self, kind: ScalarKind) -> bool {
        self.unrestricted || self.kinds.contains(&kind)
    }

    pub fn permits_tag(&self, tag: &str) -> bool {
        self.unrestricted || self.tags.contains(tag)
    }

    pub fn is_unrestricted(&self) -> bool {
        self.unrestricted
    }
}

/// Parses `text` as YAML with the given allow-list and alias policy.
///
/// Empty input yields an empty mapping.
pub fn parse(
    text: &str,
    permitted: &PermittedTypes,
    allow_aliases: bool,
) -> Result<ConfigValue, ConfigError> {
    Deserializer::new()
        .permitted_types(permitted.clone())
        .allow_aliases(allow_aliases)
        .parse(text)
}

/// Turns source text into a value tree.
///
/// ## Example
///
/// ```
/// use settings_tree::{ConfigError, Deserializer, PermittedTypes};
///
/// let value = Deserializer::new().parse("port: 8080\n")?;
/// assert_eq!(value.as_map().unwrap()["port"].as_i64(), Some(8080));
///
/// let err = Deserializer::new()
///     .permitted_types(PermittedTypes::default())
///     .parse("file: !ruby/object:File {}\n")
///     .unwrap_err();
/// assert!(matches!(err, ConfigError::DisallowedType { .. }));
/// # Ok::<(), ConfigError>(())
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct Deserializer {
    permitted: PermittedTypes,
    allow_aliases: bool,
    limits: ExpansionLimits,
    format: Option<Format>,
}

impl Default for Deserializer {
    fn default() -> Self {
        Self {
            permitted: PermittedTypes::default(),
            allow_aliases: true,
            limits: ExpansionLimits::default(),
            format: None,
        }
    }
}

impl Deserializer {
    /// Creates a deserializer with the default allow-list and aliases enabled.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn permitted_types(mut self, permitted: PermittedTypes) -> Self {
        self.permitted = permitted;
        self
    }

    /// Controls whether `*alias` references may be expanded.
    pub fn allow_aliases(mut self, allow: bool) -> Self {
        self.allow_aliases = allow;
        self
    }

    pub fn limits(mut self, limits: ExpansionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Forces a format instead of inferring it from the source.
    pub fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    /// Parses `text` in the configured format (YAML unless set).
    pub fn parse(&self, text: &str) -> Result<ConfigValue, ConfigError> {
        self.parse_as(text, self.format.unwrap_or_default())
    }

    /// Parses text read from `source`, inferring the format from it unless
    /// one was configured.
    pub fn parse_for(&self, text: &str, source: &Source) -> Result<ConfigValue, ConfigError> {
        let format = self
            .format
            .or_else(|| source.format_hint())
            .unwrap_or_default();
        self.parse_as(text, format)
    }

    fn parse_as(&self, text: &str, format: Format) -> Result<ConfigValue, ConfigError> {
        if self.permitted.is_unrestricted() {
            warn!("deserializing settings with the type allow-list disabled");
        }
        if text.trim().is_empty() {
            return Ok(ConfigValue::Map(Map::new()));
        }
        match format {
            Format::Yaml => self.parse_yaml(text),
            Format::Toml => parse_toml(text, &self.permitted),
        }
    }

    fn parse_yaml(&self, text: &str) -> Result<ConfigValue, ConfigError> {
        let mut loader = Loader::new(self);
        let mut parser = Parser::new(text.chars());
        let outcome = parser.load(&mut loader, false);

        // A loader error is always reported at or before the parser's position.
        if let Some(err) = loader.error.take() {
            return Err(err);
        }
        outcome.map_err(syntax_error)?;

        match loader.root {
            None | Some(ConfigValue::Null) => Ok(ConfigValue::Map(Map::new())),
            Some(root) => Ok(root),
        }
    }
}

fn syntax_error(err: ScanError) -> ConfigError {
    ConfigError::Syntax {
        line: err.marker().line(),
        column: err.marker().col() + 1,
        message: err.info().to_owned(),
    }
}

struct Frame {
    kind: FrameKind,
    anchor: usize,
    /// Custom tag to wrap the finished collection in.
    tag: Option<String>,
    /// Node count when the frame was opened.
    start: usize,
    line: usize,
}

enum FrameKind {
    Sequence(Vec<ConfigValue>),
    Mapping {
        entries: Map,
        pending_key: Option<PendingKey>,
        merges: Vec<ConfigValue>,
    },
}

enum PendingKey {
    /// A plain `<<`; its value is merged into the mapping.
    Merge,
    Key(String),
}

/// Builds a value tree from parser events.
struct Loader<'a> {
    options: &'a Deserializer,
    stack: Vec<Frame>,
    /// Finished anchored values and their node counts.
    anchors: HashMap<usize, (ConfigValue, usize)>,
    nodes: usize,
    root: Option<ConfigValue>,
    error: Option<ConfigError>,
}

impl MarkedEventReceiver for Loader<'_> {
    fn on_event(&mut self, event: Event, mark: Marker) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = self.handle(event, mark.line()) {
            self.error = Some(err);
        }
    }
}

impl<'a> Loader<'a> {
    fn new(options: &'a Deserializer) -> Self {
        Self {
            options,
            stack: Vec::new(),
            anchors: HashMap::new(),
            nodes: 0,
            root: None,
            error: None,
        }
    }

    fn handle(&mut self, event: Event, line: usize) -> Result<(), ConfigError> {
        match event {
            Event::Scalar(text, style, anchor, tag) => {
                self.count(1)?;
                if self.expecting_key()
                    && tag.is_none()
                    && matches!(style, TScalarStyle::Plain)
                    && text == MERGE_KEY
                {
                    self.expect_merge();
                    return Ok(());
                }
                let value = if self.expecting_key() && tag.is_none() {
                    ConfigValue::String(plain_key(text, &style))
                } else {
                    self.scalar(text, &style, tag.as_ref())?
                };
                self.finish(value, anchor, 1, line)
            }
            Event::SequenceStart(anchor, tag) => {
                self.open(FrameKind::Sequence(Vec::new()), anchor, tag.as_ref(), line)
            }
            Event::MappingStart(anchor, tag) => self.open(
                FrameKind::Mapping {
                    entries: Map::new(),
                    pending_key: None,
                    merges: Vec::new(),
                },
                anchor,
                tag.as_ref(),
                line,
            ),
            Event::SequenceEnd | Event::MappingEnd => {
                let Some(frame) = self.stack.pop() else {
                    return Ok(());
                };
                let size = self.nodes - frame.start + 1;
                let anchor = frame.anchor;
                let value = close(frame)?;
                self.finish(value, anchor, size, line)
            }
            Event::Alias(id) => self.alias(id, line),
            _ => Ok(()),
        }
    }

    fn count(&mut self, nodes: usize) -> Result<(), ConfigError> {
        self.nodes = self.nodes.saturating_add(nodes);
        if self.nodes > self.options.limits.max_nodes {
            return Err(ConfigError::ExpansionLimit {
                limit: self.options.limits.max_nodes,
            });
        }
        Ok(())
    }

    fn expecting_key(&self) -> bool {
        matches!(
            self.stack.last(),
            Some(Frame {
                kind: FrameKind::Mapping {
                    pending_key: None,
                    ..
                },
                ..
            })
        )
    }

    fn open(
        &mut self,
        kind: FrameKind,
        anchor: usize,
        tag: Option<&Tag>,
        line: usize,
    ) -> Result<(), ConfigError> {
        self.count(1)?;
        if self.stack.len() >= self.options.limits.max_depth {
            return Err(ConfigError::NestingTooDeep {
                limit: self.options.limits.max_depth,
            });
        }

        let tag = match tag {
            None => None,
            Some(tag) => match (core_suffix(tag), &kind) {
                (Some("map"), FrameKind::Mapping { .. }) | (Some("seq"), FrameKind::Sequence(_)) => {
                    None
                }
                _ => Some(self.permit_tag(tag)?),
            },
        };

        self.stack.push(Frame {
            kind,
            anchor,
            tag,
            start: self.nodes,
            line,
        });
        Ok(())
    }

    fn alias(&mut self, id: usize, line: usize) -> Result<(), ConfigError> {
        if !self.options.allow_aliases {
            return Err(ConfigError::BadAlias {
                line,
                reason: "aliases are disabled".to_string(),
            });
        }
        if self.stack.iter().any(|frame| frame.anchor == id) {
            return Err(ConfigError::AliasCycle { line });
        }
        let unknown = || ConfigError::BadAlias {
            line,
            reason: "unknown anchor".to_string(),
        };
        let size = self.anchors.get(&id).map(|(_, size)| *size).ok_or_else(unknown)?;
        // Count before copying so oversized expansions are never materialized.
        self.count(size)?;
        let value = self
            .anchors
            .get(&id)
            .map(|(value, _)| value.clone())
            .ok_or_else(unknown)?;
        self.finish(value, 0, size, line)
    }

    /// Records an anchored value and attaches it to the enclosing collection.
    fn finish(
        &mut self,
        value: ConfigValue,
        anchor: usize,
        size: usize,
        line: usize,
    ) -> Result<(), ConfigError> {
        if anchor != 0 {
            self.anchors.insert(anchor, (value.clone(), size));
        }

        match self.stack.last_mut() {
            None => {
                if self.root.is_none() {
                    self.root = Some(value);
                }
            }
            Some(Frame {
                kind: FrameKind::Sequence(items),
                ..
            }) => items.push(value),
            Some(Frame {
                kind:
                    FrameKind::Mapping {
                        entries,
                        pending_key,
                        merges,
                    },
                ..
            }) => match pending_key.take() {
                None => *pending_key = Some(PendingKey::Key(key_text(value, line)?)),
                Some(PendingKey::Merge) => merges.push(value),
                Some(PendingKey::Key(key)) => {
                    entries.insert(key, value);
                }
            },
        }
        Ok(())
    }

    fn expect_merge(&mut self) {
        if let Some(Frame {
            kind: FrameKind::Mapping { pending_key, .. },
            ..
        }) = self.stack.last_mut()
        {
            *pending_key = Some(PendingKey::Merge);
        }
    }

    fn scalar(
        &self,
        text: String,
        style: &TScalarStyle,
        tag: Option<&Tag>,
    ) -> Result<ConfigValue, ConfigError> {
        let value = match tag {
            Some(tag) => self.tagged_scalar(text, tag)?,
            None if matches!(style, TScalarStyle::Plain) => resolve_plain(text),
            None => ConfigValue::String(text),
        };

        if let Some(kind) = value.scalar_kind() {
            if !self.options.permitted.permits_kind(kind) {
                return Err(ConfigError::DisallowedType {
                    type_name: kind.name().to_string(),
                });
            }
        }
        Ok(value)
    }

    fn tagged_scalar(&self, text: String, tag: &Tag) -> Result<ConfigValue, ConfigError> {
        let invalid = |text: &str| ConfigError::InvalidScalar {
            tag: tag_name(tag),
            value: text.to_owned(),
        };

        let value = match (core_suffix(tag), local_name(tag).as_deref()) {
            (Some("str"), _) => ConfigValue::String(text),
            (Some("null"), _) => ConfigValue::Null,
            (Some("int"), _) => parse_int(&text)
                .map(ConfigValue::Integer)
                .ok_or_else(|| invalid(&text))?,
            (Some("float"), _) => parse_float(&text)
                .or_else(|| parse_int(&text).map(|i| i as f64))
                .map(ConfigValue::Float)
                .ok_or_else(|| invalid(&text))?,
            (Some("bool"), _) => parse_bool(&text)
                .map(ConfigValue::Bool)
                .ok_or_else(|| invalid(&text))?,
            (Some("timestamp"), _) => parse_date(&text)
                .map(ConfigValue::Date)
                .or_else(|| parse_timestamp(&text).map(ConfigValue::Timestamp))
                .ok_or_else(|| invalid(&text))?,
            (Some("decimal"), _) | (_, Some("decimal")) => {
                let digits = text.trim().replace('_', "");
                if digits.parse::<f64>().is_err() || !has_digit(&digits) {
                    return Err(invalid(&text));
                }
                ConfigValue::Decimal(digits)
            }
            (_, Some("ruby/symbol" | "ruby/sym")) => ConfigValue::Symbol(Symbol::new(text)),
            _ => ConfigValue::Tagged {
                tag: self.permit_tag(tag)?,
                value: Box::new(ConfigValue::String(text)),
            },
        };
        Ok(value)
    }

    fn permit_tag(&self, tag: &Tag) -> Result<String, ConfigError> {
        let name = tag_name(tag);
        if self.options.permitted.permits_tag(&name) {
            Ok(name)
        } else {
            Err(ConfigError::DisallowedType { type_name: name })
        }
    }
}

fn close(frame: Frame) -> Result<ConfigValue, ConfigError> {
    let value = match frame.kind {
        FrameKind::Sequence(items) => ConfigValue::List(items),
        FrameKind::Mapping {
            mut entries,
            merges,
            ..
        } => {
            for merge in merges {
                apply_merge(&mut entries, merge, frame.line)?;
            }
            ConfigValue::Map(entries)
        }
    };

    Ok(match frame.tag {
        Some(tag) => ConfigValue::Tagged {
            tag,
            value: Box::new(value),
        },
        None => value,
    })
}

/// Applies a `<<` merge key; keys already present in the mapping win.
fn apply_merge(entries: &mut Map, merge: ConfigValue, line: usize) -> Result<(), ConfigError> {
    match merge {
        ConfigValue::Map(source) => {
            for (key, value) in source {
                entries.entry(key).or_insert(value);
            }
            Ok(())
        }
        ConfigValue::List(sources) => sources
            .into_iter()
            .try_for_each(|source| match source {
                ConfigValue::Map(_) => apply_merge(entries, source, line),
                _ => Err(bad_merge(line)),
            }),
        _ => Err(bad_merge(line)),
    }
}

fn bad_merge(line: usize) -> ConfigError {
    ConfigError::Syntax {
        line,
        column: 1,
        message: "merge key value must be a mapping or a list of mappings".to_string(),
    }
}

fn key_text(value: ConfigValue, line: usize) -> Result<String, ConfigError> {
    let text = match value {
        ConfigValue::String(s) | ConfigValue::Decimal(s) => s,
        ConfigValue::Symbol(symbol) => symbol.as_str().to_owned(),
        ConfigValue::Null => String::new(),
        ConfigValue::Bool(b) => b.to_string(),
        ConfigValue::Integer(i) => i.to_string(),
        ConfigValue::Float(f) => f.to_string(),
        ConfigValue::Date(date) => date.to_string(),
        ConfigValue::Timestamp(ts) => ts.to_rfc3339(),
        ConfigValue::Tagged { value, .. } => return key_text(*value, line),
        ConfigValue::List(_) | ConfigValue::Map(_) | ConfigValue::Node(_) => {
            return Err(ConfigError::Syntax {
                line,
                column: 1,
                message: "mapping keys must be scalars".to_string(),
            })
        }
    };
    Ok(text)
}

/// Untagged keys keep their text; a plain `:name` key drops the colon.
fn plain_key(text: String, style: &TScalarStyle) -> String {
    if matches!(style, TScalarStyle::Plain) && text.len() > 1 {
        if let Some(name) = text.strip_prefix(':') {
            return name.to_owned();
        }
    }
    text
}

/// The suffix of a `!!` (core schema) tag.
fn core_suffix(tag: &Tag) -> Option<&str> {
    match tag.handle.as_str() {
        "!!" | "tag:yaml.org,2002:" => Some(tag.suffix.as_str()),
        _ => None,
    }
}

/// The name of a `!name` local tag.
fn local_name(tag: &Tag) -> Option<String> {
    match tag.handle.as_str() {
        "!" => Some(tag.suffix.clone()),
        "" => tag.suffix.strip_prefix('!').map(str::to_owned),
        _ => None,
    }
}

/// The tag as matched against the allow-list.
fn tag_name(tag: &Tag) -> String {
    match core_suffix(tag) {
        Some(suffix) => format!("!!{suffix}"),
        None => format!("{}{}", tag.handle, tag.suffix),
    }
}

/// Resolves an untagged plain scalar.
fn resolve_plain(text: String) -> ConfigValue {
    match text.as_str() {
        "" | "~" | "null" | "Null" | "NULL" => return ConfigValue::Null,
        ".inf" | ".Inf" | ".INF" | "+.inf" | "+.Inf" | "+.INF" => {
            return ConfigValue::Float(f64::INFINITY)
        }
        "-.inf" | "-.Inf" | "-.INF" => return ConfigValue::Float(f64::NEG_INFINITY),
        ".nan" | ".NaN" | ".NAN" => return ConfigValue::Float(f64::NAN),
        _ => {}
    }

    if let Some(b) = parse_bool(&text) {
        ConfigValue::Bool(b)
    } else if let Some(i) = parse_int(&text) {
        ConfigValue::Integer(i)
    } else if let Some(f) = parse_float(&text) {
        ConfigValue::Float(f)
    } else if let Some(date) = parse_date(&text) {
        ConfigValue::Date(date)
    } else if let Some(ts) = parse_timestamp(&text) {
        ConfigValue::Timestamp(ts)
    } else if text.len() > 1 && text.starts_with(':') {
        ConfigValue::Symbol(Symbol::new(&text[1..]))
    } else {
        ConfigValue::String(text)
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "true" | "True" | "TRUE" | "yes" | "Yes" | "YES" | "on" | "On" | "ON" => Some(true),
        "false" | "False" | "FALSE" | "no" | "No" | "NO" | "off" | "Off" | "OFF" => Some(false),
        _ => None,
    }
}

fn parse_int(text: &str) -> Option<i64> {
    let cleaned = text.replace('_', "");
    let (negative, digits) = match cleaned.as_bytes().first()? {
        b'-' => (true, &cleaned[1..]),
        b'+' => (false, &cleaned[1..]),
        _ => (false, cleaned.as_str()),
    };

    let (radix, digits) = if let Some(hex) = digits.strip_prefix("0x") {
        (16, hex)
    } else if let Some(octal) = digits.strip_prefix("0o") {
        (8, octal)
    } else if let Some(binary) = digits.strip_prefix("0b") {
        (2, binary)
    } else if let Some(octal) = legacy_octal(digits) {
        (8, octal)
    } else {
        (10, digits)
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }

    let magnitude = i64::from_str_radix(digits, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

fn parse_float(text: &str) -> Option<f64> {
    let cleaned = text.replace('_', "");
    let looks_numeric = has_digit(&cleaned)
        && cleaned
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    let unsigned = cleaned.trim_start_matches(|c: char| c == '+' || c == '-');
    if !looks_numeric || legacy_octal(unsigned).is_some() {
        return None;
    }
    cleaned.parse().ok()
}

/// YAML 1.1 octal: a `0` followed by more digits, as in `017`.
fn legacy_octal(digits: &str) -> Option<&str> {
    digits
        .strip_prefix('0')
        .filter(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

fn has_digit(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_digit())
}

fn is_date_shape(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit())
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    if !is_date_shape(text) {
        return None;
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

/// Parses `YYYY-MM-DD[T ]hh:mm:ss[.frac][Z|±hh[:mm]]`. A timestamp without
/// a zone is taken as UTC.
fn parse_timestamp(text: &str) -> Option<DateTime<FixedOffset>> {
    let date = text.get(..10).filter(|date| is_date_shape(date))?;
    let rest = text
        .get(10..)?
        .strip_prefix(|c: char| matches!(c, 'T' | 't' | ' '))?
        .trim();

    let (time, offset) = if let Some(time) = rest.strip_suffix(|c: char| matches!(c, 'Z' | 'z')) {
        (time.trim_end(), FixedOffset::east_opt(0)?)
    } else if let Some(at) = rest.rfind(|c: char| matches!(c, '+' | '-')) {
        (rest[..at].trim_end(), parse_offset(&rest[at..])?)
    } else {
        (rest, FixedOffset::east_opt(0)?)
    };

    let naive =
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M:%S%.f").ok()?;
    offset.from_local_datetime(&naive).single()
}

fn parse_offset(zone: &str) -> Option<FixedOffset> {
    let sign = if zone.starts_with('-') { -1 } else { 1 };
    let digits: String = zone[1..].chars().filter(|c| *c != ':').collect();
    if digits.is_empty() || digits.len() > 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = if digits.len() <= 2 {
        (digits.parse::<i32>().ok()?, 0)
    } else {
        let split = digits.len() - 2;
        (
            digits[..split].parse::<i32>().ok()?,
            digits[split..].parse::<i32>().ok()?,
        )
    };
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn parse_toml(text: &str, permitted: &PermittedTypes) -> Result<ConfigValue, ConfigError> {
    let table: toml::Table = toml::from_str(text).map_err(|e| {
        let offset = e.span().map(|span| span.start).unwrap_or_default();
        let before = &text[..offset.min(text.len())];
        ConfigError::Syntax {
            line: before.matches('\n').count() + 1,
            column: before.len() - before.rfind('\n').map_or(0, |i| i + 1) + 1,
            message: e.message().to_owned(),
        }
    })?;
    from_toml(toml::Value::Table(table), permitted)
}

fn from_toml(value: toml::Value, permitted: &PermittedTypes) -> Result<ConfigValue, ConfigError> {
    let value = match value {
        toml::Value::String(s) => ConfigValue::String(s),
        toml::Value::Integer(i) => ConfigValue::Integer(i),
        toml::Value::Float(f) => ConfigValue::Float(f),
        toml::Value::Boolean(b) => ConfigValue::Bool(b),
        toml::Value::Datetime(dt) => from_toml_datetime(&dt)?,
        toml::Value::Array(items) => ConfigValue::List(
            items
                .into_iter()
                .map(|item| from_toml(item, permitted))
                .collect::<Result<_, _>>()?,
        ),
        toml::Value::Table(table) => ConfigValue::Map(
            table
                .into_iter()
                .map(|(key, value)| Ok((key, from_toml(value, permitted)?)))
                .collect::<Result<_, ConfigError>>()?,
        ),
    };

    if let Some(kind) = value.scalar_kind() {
        if !permitted.permits_kind(kind) {
            return Err(ConfigError::DisallowedType {
                type_name: kind.name().to_string(),
            });
        }
    }
    Ok(value)
}

fn from_toml_datetime(dt: &toml::value::Datetime) -> Result<ConfigValue, ConfigError> {
    let invalid = || ConfigError::InvalidScalar {
        tag: "datetime".to_string(),
        value: dt.to_string(),
    };
    let Some(date) = dt.date else {
        return Err(ConfigError::DisallowedType {
            type_name: "time".to_string(),
        });
    };
    let date = NaiveDate::from_ymd_opt(i32::from(date.year), u32::from(date.month), u32::from(date.day))
        .ok_or_else(invalid)?;

    let Some(time) = dt.time else {
        return Ok(ConfigValue::Date(date));
    };
    let naive = date
        .and_hms_nano_opt(
            u32::from(time.hour),
            u32::from(time.minute),
            u32::from(time.second),
            time.nanosecond,
        )
        .ok_or_else(invalid)?;
    let offset = match dt.offset {
        Some(toml::value::Offset::Custom { minutes }) => {
            FixedOffset::east_opt(i32::from(minutes) * 60).ok_or_else(invalid)?
        }
        Some(toml::value::Offset::Z) | None => FixedOffset::east_opt(0).ok_or_else(invalid)?,
    };
    offset
        .from_local_datetime(&naive)
        .single()
        .map(ConfigValue::Timestamp)
        .ok_or_else(invalid)
}

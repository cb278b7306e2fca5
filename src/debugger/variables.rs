use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::OnceLock;

use log::debug;
use regex::Regex;

use crate::config::VarLoadParams;
use crate::debugger::location::FileLocation;

/// Structs with at most this many primitive fields are flattened into their value
pub const MAX_FLATTEN_FIELDS: usize = 9;

/// Nesting deeper than this is cut off while decoding
const MAX_DECODE_DEPTH: usize = 64;

/// Classification of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VarKind {
    /// Numbers, booleans, strings
    Primitive,
    Pointer,
    /// Arrays and slices
    List,
    Map,
    Struct,
    Interface,
    Channel,
    Function,
    #[default]
    Other,
}

impl VarKind {
    /// Check if values of this kind have fields or elements
    pub fn is_composite(&self) -> bool {
        matches!(self, VarKind::List | VarKind::Map | VarKind::Struct | VarKind::Interface)
    }

    /// Check if this is a primitive, non-pointer kind
    pub fn is_primitive(&self) -> bool {
        matches!(self, VarKind::Primitive)
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            VarKind::Primitive => "primitive",
            VarKind::Pointer => "pointer",
            VarKind::List => "list",
            VarKind::Map => "map",
            VarKind::Struct => "struct",
            VarKind::Interface => "interface",
            VarKind::Channel => "channel",
            VarKind::Function => "function",
            VarKind::Other => "other",
        }
    }
}

impl fmt::Display for VarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A value as the backend reported it, before decoding
///
/// Backends convert their wire representation into this shape at their
/// boundary so that nothing backend specific leaks into [`Variable`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawValue {
    pub name: String,
    /// Full type name
    pub type_name: String,
    pub kind: VarKind,
    pub value: String,
    /// Length of lists, maps, strings and channels
    pub len: i64,
    /// Capacity of lists and channels
    pub cap: i64,
    pub addr: u64,
    /// The value escaped to the heap
    pub on_heap: bool,
    /// The value is a function argument
    pub is_arg: bool,
    /// Line of the declaration, 0 when unknown
    pub decl_line: u32,
    pub children: Vec<RawValue>,
    /// Set when the backend could not read the value
    pub unreadable: Option<String>,
}

/// A decoded variable tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variable {
    pub name: String,
    /// Type name with long import paths collapsed
    pub type_display: String,
    /// Type name as reported
    pub type_full: String,
    pub kind: VarKind,
    pub value: String,
    /// Value of the pointee for pointers to primitives
    pub element_value: String,
    pub length: i64,
    pub capacity: i64,
    pub addr: u64,
    pub on_heap: bool,
    pub is_arg: bool,
    /// Declaration site
    pub def_loc: FileLocation,
    pub children: Vec<Variable>,
    /// Set instead of `children` for lists of primitives
    pub primitive_list: Option<Vec<String>>,
    /// Set instead of `children` for maps from primitives to primitives
    pub primitive_map: Option<BTreeMap<String, String>>,
    /// Set instead of `children` for maps from primitives to composites
    pub object_map: Option<BTreeMap<String, Variable>>,
    /// Expression that evaluates to this variable in its scope, empty if unknown
    pub expr: String,
    /// The pointee has been requested from the backend
    pub(crate) followed: bool,
}

impl Variable {
    /// Placeholder for a value that failed to decode
    pub fn error(name: impl Into<String>, message: &str) -> Self {
        let name = name.into();
        Self {
            expr: name.clone(),
            name,
            kind: VarKind::Other,
            value: format!("<err: {}>", message),
            ..Default::default()
        }
    }

    /// Check if this is a decode error placeholder
    pub fn is_error(&self) -> bool {
        self.kind == VarKind::Other && self.value.starts_with("<err:")
    }

    /// Find a direct child by name
    pub fn child(&self, name: &str) -> Option<&Variable> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Check if the pointee of this pointer has been requested already
    pub fn is_followed(&self) -> bool {
        self.followed
    }

    /// Expression to request from the backend to complete a lazily loaded pointee
    ///
    /// Returns `None` unless this is a pointer whose single child is composite
    /// but carries no content yet.
    pub fn pointee_request(&self) -> Option<String> {
        if self.kind != VarKind::Pointer || self.followed || self.children.len() != 1 {
            return None;
        }
        let child = &self.children[0];
        let empty = child.children.is_empty()
            && child.primitive_list.is_none()
            && child.primitive_map.is_none()
            && child.object_map.is_none()
            && child.value.is_empty();
        if !child.kind.is_composite() || !empty {
            return None;
        }
        let base = if self.expr.is_empty() { &self.name } else { &self.expr };
        Some(format!("*{}", base))
    }

    /// Replace the pointee with a freshly loaded value
    pub fn attach_pointee(&mut self, mut pointee: Variable) {
        pointee.name = format!("*{}", self.name);
        if pointee.kind.is_primitive() {
            self.element_value = pointee.value.clone();
        }
        self.children = vec![pointee];
        self.followed = true;
    }

    /// Mark a pointer as followed without replacing its child
    pub fn mark_followed(&mut self) {
        self.followed = true;
    }

    /// Format as `name type = value` on one line
    pub fn format(&self, opts: &RenderOpts) -> String {
        let mut result = format!("{} {} = {}", self.name, self.type_display, render(self, opts));
        if self.on_heap {
            result.push_str(" (heap)");
        }
        result
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(&RenderOpts::default()))
    }
}

fn import_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9_.\-~]+(?:/[A-Za-z0-9_.\-~]+)+").expect("import path pattern is valid"))
}

/// Collapse import-style path prefixes in a type name to their final two segments
pub fn short_type_name(full: &str) -> String {
    import_path_regex()
        .replace_all(full, |caps: &regex::Captures<'_>| {
            let path = &caps[0];
            let segments: Vec<&str> = path.split('/').collect();
            if segments.len() <= 2 {
                path.to_string()
            } else {
                segments[segments.len() - 2..].join("/")
            }
        })
        .into_owned()
}

/// Decode a backend value into a variable tree
pub fn decode(raw: &RawValue) -> Variable {
    decode_at(raw, &raw.name, 0)
}

/// Decode every value of a listing
pub fn decode_all(raws: &[RawValue]) -> Vec<Variable> {
    raws.iter().map(decode).collect()
}

fn decode_at(raw: &RawValue, expr: &str, depth: usize) -> Variable {
    if let Some(msg) = &raw.unreadable {
        debug!("Unreadable value {}: {}", raw.name, msg);
        let mut var = Variable::error(raw.name.clone(), msg);
        var.type_full = raw.type_name.clone();
        var.type_display = short_type_name(&raw.type_name);
        var.addr = raw.addr;
        return var;
    }

    let mut var = Variable {
        name: raw.name.clone(),
        type_display: short_type_name(&raw.type_name),
        type_full: raw.type_name.clone(),
        kind: raw.kind,
        value: raw.value.clone(),
        length: raw.len,
        capacity: raw.cap,
        addr: raw.addr,
        on_heap: raw.on_heap,
        is_arg: raw.is_arg,
        def_loc: if raw.decl_line > 0 {
            FileLocation::new("", raw.decl_line)
        } else {
            FileLocation::default()
        },
        expr: expr.to_string(),
        ..Default::default()
    };

    if depth >= MAX_DECODE_DEPTH {
        if !raw.children.is_empty() {
            var.value = "…".to_string();
        }
        return var;
    }

    let n = raw.children.len();
    match raw.kind {
        VarKind::Pointer if n == 1 => {
            let name = format!("*{}", raw.name);
            let child_expr = format!("*{}", expr);
            let mut child = decode_at(&raw.children[0], &child_expr, depth + 1);
            if raw.children[0].name.is_empty() {
                child.name = name;
            }
            if child.kind.is_primitive() {
                var.element_value = child.value.clone();
            }
            var.children.push(child);
        }
        VarKind::List if n > 0 && raw.children[0].kind.is_primitive() => {
            var.primitive_list = Some(raw.children.iter().map(|c| c.value.clone()).collect());
        }
        VarKind::Map if n > 1 => decode_map(&mut var, raw, depth),
        VarKind::Struct if (1..=MAX_FLATTEN_FIELDS).contains(&n) && raw.children.iter().all(|c| c.kind.is_primitive() && c.unreadable.is_none()) => {
            var.value = raw
                .children
                .iter()
                .map(|c| format!("{}: {}", c.name, c.value))
                .collect::<Vec<_>>()
                .join(", ");
        }
        _ => {
            var.children = decode_children(raw, expr, depth);
        }
    }
    var
}

fn decode_children(raw: &RawValue, expr: &str, depth: usize) -> Vec<Variable> {
    raw.children
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let positional = c.name.is_empty();
            let child_expr = match (raw.kind, positional) {
                (VarKind::List, _) => format!("{}[{}]", expr, i),
                (_, false) if !expr.is_empty() => format!("{}.{}", expr, c.name),
                _ => String::new(),
            };
            let mut child = decode_at(c, &child_expr, depth + 1);
            if positional {
                child.name = format!("[{}]", i);
            }
            child
        })
        .collect()
}

fn decode_map(var: &mut Variable, raw: &RawValue, depth: usize) {
    let keys_primitive = raw.children.iter().step_by(2).all(|k| k.kind.is_primitive());
    let values_primitive = raw.children[1].kind.is_primitive();

    if keys_primitive && values_primitive {
        let map = raw
            .children
            .chunks(2)
            .filter(|pair| pair.len() == 2)
            .map(|pair| (pair[0].value.clone(), pair[1].value.clone()))
            .collect();
        var.primitive_map = Some(map);
    } else if keys_primitive {
        let map = raw
            .children
            .chunks(2)
            .filter(|pair| pair.len() == 2)
            .map(|pair| {
                let key = pair[0].value.clone();
                let mut value = decode_at(&pair[1], "", depth + 1);
                if value.name.is_empty() {
                    value.name = format!("[{}]", key);
                }
                (key, value)
            })
            .collect();
        var.object_map = Some(map);
    } else {
        var.children = raw
            .children
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let mut child = decode_at(c, "", depth + 1);
                if child.name.is_empty() {
                    child.name = if i % 2 == 0 {
                        format!("key[{}]", i / 2)
                    } else {
                        format!("value[{}]", i / 2)
                    };
                }
                child
            })
            .collect();
    }
}

/// Options for [`render`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOpts {
    /// Maximum nesting rendered before cutting a subtree with `…`
    pub max_depth: usize,
    /// Maximum output length before cutting with `…`
    pub max_len: usize,
    /// Put each child on its own indented line
    pub multiline: bool,
}

impl RenderOpts {
    /// Render limits matching variable load limits
    pub fn from_params(params: &VarLoadParams, multiline: bool) -> Self {
        Self {
            max_depth: params.max_recurse.max(0) as usize,
            max_len: params.max_string_len.max(1) as usize,
            multiline,
        }
    }
}

impl Default for RenderOpts {
    fn default() -> Self {
        Self {
            max_depth: 4,
            max_len: 1024,
            multiline: false,
        }
    }
}

/// Pretty-print a variable's value
///
/// Primitives render as their value, truncated to `max_len` characters with
/// a trailing `…`. A string the backend only loaded in part also ends in `…`.
pub fn render(var: &Variable, opts: &RenderOpts) -> String {
    let mut r = Renderer {
        out: String::new(),
        len: 0,
        opts,
    };
    r.var(var, 0);
    r.out
}

/// Output buffer that tracks its length in characters
struct Renderer<'a> {
    out: String,
    len: usize,
    opts: &'a RenderOpts,
}

impl Renderer<'_> {
    fn push(&mut self, c: char) {
        self.out.push(c);
        self.len += 1;
    }

    fn push_str(&mut self, s: &str) {
        self.out.push_str(s);
        self.len += s.chars().count();
    }

    fn full(&self) -> bool {
        self.len >= self.opts.max_len
    }

    /// Primitive value cut to the remaining room
    fn leaf(&mut self, var: &Variable) {
        let room = self.opts.max_len.saturating_sub(self.len);
        let mut cut = false;
        for (i, c) in var.value.chars().enumerate() {
            if i == room {
                cut = true;
                break;
            }
            self.push(c);
        }
        let partial = var.kind == VarKind::Primitive && var.length > var.value.len() as i64;
        if cut || partial {
            self.push('…');
        }
    }

    fn var(&mut self, var: &Variable, depth: usize) {
        if self.full() {
            self.push('…');
            return;
        }
        match var.kind {
            VarKind::Pointer => self.pointer(var, depth),
            _ if var.children.is_empty()
                && var.primitive_list.is_none()
                && var.primitive_map.is_none()
                && var.object_map.is_none() =>
            {
                if matches!(var.kind, VarKind::Struct | VarKind::Interface) && !var.value.is_empty() && !var.is_error() {
                    self.push('{');
                    self.leaf(var);
                    self.push('}');
                } else {
                    self.leaf(var);
                }
            }
            _ => self.composite(var, depth),
        }
    }

    fn pointer(&mut self, var: &Variable, depth: usize) {
        match var.children.first() {
            Some(child) if var.addr != 0 || !child.value.is_empty() || !child.children.is_empty() => {
                self.push('&');
                self.var(child, depth + 1);
            }
            _ if var.addr == 0 && var.value.is_empty() => self.push_str("nil"),
            _ if !var.value.is_empty() => self.push_str(&var.value),
            _ => self.push_str(&format!("0x{:x}", var.addr)),
        }
    }

    fn label(&mut self, label: &Option<String>) {
        if let Some(label) = label {
            self.push_str(label);
            self.push_str(": ");
        }
    }

    fn composite(&mut self, var: &Variable, depth: usize) {
        if depth > self.opts.max_depth {
            self.push('…');
            return;
        }
        let (open, close) = if var.kind == VarKind::List { ('[', ']') } else { ('{', '}') };
        let mut items: Vec<Item<'_>> = Vec::new();
        if let Some(list) = &var.primitive_list {
            items.extend(list.iter().map(|v| Item::Text(None, v.clone())));
        } else if let Some(map) = &var.primitive_map {
            items.extend(map.iter().map(|(k, v)| Item::Text(Some(k.clone()), v.clone())));
        } else if let Some(map) = &var.object_map {
            items.extend(map.iter().map(|(k, v)| Item::Var(Some(k.clone()), v)));
        } else if var.kind == VarKind::Map {
            for pair in var.children.chunks(2) {
                match pair {
                    [k, v] => items.push(Item::Pair(k, v)),
                    [k] => items.push(Item::Var(None, k)),
                    _ => {}
                }
            }
        } else {
            let mut seen: HashMap<u64, &str> = HashMap::new();
            for child in &var.children {
                if child.addr != 0 && child.kind.is_composite() {
                    if let Some(first) = seen.get(&child.addr) {
                        items.push(Item::Text(Some(child.name.clone()), format!("(same as {})", first)));
                        continue;
                    }
                    seen.insert(child.addr, &child.name);
                }
                let label = if var.kind == VarKind::List { None } else { Some(child.name.clone()) };
                items.push(Item::Var(label, child));
            }
        }

        self.push(open);
        let indent = "  ".repeat(depth + 1);
        for (i, item) in items.iter().enumerate() {
            if self.full() {
                self.push('…');
                break;
            }
            if self.opts.multiline {
                self.push('\n');
                self.push_str(&indent);
            } else if i > 0 {
                self.push_str(", ");
            }
            match item {
                Item::Text(label, value) => {
                    self.label(label);
                    self.push_str(value);
                }
                Item::Var(label, child) => {
                    self.label(label);
                    self.var(child, depth + 1);
                }
                Item::Pair(key, value) => {
                    self.var(key, depth + 1);
                    self.push_str(": ");
                    self.var(value, depth + 1);
                }
            }
            if self.opts.multiline {
                self.push(',');
            }
        }
        if self.opts.multiline && !items.is_empty() {
            self.push('\n');
            self.push_str(&"  ".repeat(depth));
        }
        self.push(close);
    }
}

enum Item<'a> {
    Text(Option<String>, String),
    Var(Option<String>, &'a Variable),
    Pair(&'a Variable, &'a Variable),
}

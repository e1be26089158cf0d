//! Wire grammar: one request per line, `&`-separated fields, `key=value`
//! pairs, and the escape/unescape rules that keep `&`, `=`, `\n` and `\`
//! inside values from colliding with the delimiters.

use std::collections::HashMap;

use crate::error::RequestError;

/// The kind of request a client line encodes. Unrecognized kinds parse to
/// `Invalid` rather than failing outright, per the wire grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Login,
    NewDoc,
    OpenDoc,
    Change,
    ExitDoc,
    Logout,
    CorrectError,
    Chat,
    Invalid,
}

impl RequestKind {
    fn from_token(token: &str) -> Self {
        match token {
            "LOGIN" => Self::Login,
            "NEWDOC" => Self::NewDoc,
            "OPENDOC" => Self::OpenDoc,
            "CHANGE" | "CHANGEDOC" => Self::Change,
            "EXITDOC" => Self::ExitDoc,
            "LOGOUT" => Self::Logout,
            "CORRECT_ERROR" | "CORRECTERROR" => Self::CorrectError,
            "CHAT" | "CHATMESSAGE" => Self::Chat,
            _ => Self::Invalid,
        }
    }
}

/// One parsed request line, tagged with the connection it arrived on.
#[derive(Debug, Clone)]
pub struct Request {
    pub conn_id: u64,
    pub kind: RequestKind,
    fields: HashMap<String, String>,
}

impl Request {
    /// Parses `<KIND>&key1=val1&key2=val2&...&`. A line with no fields and
    /// an unrecognized kind still parses successfully, as `RequestKind::Invalid`.
    pub fn parse(conn_id: u64, line: &str) -> Self {
        let mut parts = line.split('&');
        let kind = RequestKind::from_token(parts.next().unwrap_or_default());
        let mut fields = HashMap::new();
        for part in parts {
            if part.is_empty() {
                continue;
            }
            if let Some((key, value)) = part.split_once('=') {
                fields.insert(key.to_string(), unescape(value));
            }
        }
        Self {
            conn_id,
            kind,
            fields,
        }
    }

    pub fn field(&self, key: &'static str) -> Result<&str, RequestError> {
        self.fields
            .get(key)
            .map(String::as_str)
            .ok_or(RequestError::MissingField(key))
    }

    pub fn field_u64(&self, key: &'static str) -> Result<u64, RequestError> {
        self.field(key)?
            .parse()
            .map_err(|_| RequestError::InvalidInteger(key))
    }

    pub fn field_usize(&self, key: &'static str) -> Result<usize, RequestError> {
        self.field(key)?
            .parse()
            .map_err(|_| RequestError::InvalidInteger(key))
    }
}

/// Escapes `\`, `&`, `=`, and newline so a value can be embedded as a
/// `key=value` field without colliding with the grammar's delimiters.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '&' => out.push_str("\\&"),
            '=' => out.push_str("\\="),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

/// Inverse of [`escape`]. An unrecognized escape sequence is passed through
/// literally (backslash kept) rather than dropped.
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('&') => out.push('&'),
            Some('=') => out.push('='),
            Some('n') => out.push('\n'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Encodes document/chat text for the wire: real newlines become a literal
/// TAB character, since the client guarantees a user can never type one.
/// This keeps a multi-line payload on a single wire line.
pub fn wire_text(text: &str) -> String {
    text.replace('\n', "\t")
}

/// Inverse of [`wire_text`].
pub fn unwire_text(text: &str) -> String {
    text.replace('\t', "\n")
}

/// `"R,G,B"` for one color triple.
pub fn color_csv((r, g, b): (u8, u8, u8)) -> String {
    format!("{r},{g},{b}")
}

/// Multiple colors, in collaborator order. The distilled spec never
/// disambiguates the delimiter for a multi-user color list (its worked
/// examples only ever show one collaborator); semicolon is used here so it
/// can't collide with the commas inside each `"R,G,B"` triple. See
/// DESIGN.md.
pub fn colors_csv(colors: &[(u8, u8, u8)]) -> String {
    colors
        .iter()
        .map(|c| color_csv(*c))
        .collect::<Vec<_>>()
        .join(";")
}

pub const INVALID_REQUEST: &str = "Invalid request";

pub fn id_response(conn_id: u64) -> String {
    format!("id&id={conn_id}&")
}

pub fn loggedin_response(user: &str, conn_id: u64, docinfo: &str) -> String {
    if docinfo.is_empty() {
        return format!(
            "loggedin&userName={}&id={conn_id}&\nenddocinfo&userName={}&",
            escape(user),
            escape(user)
        );
    }
    format!(
        "loggedin&userName={}&id={conn_id}&\n{docinfo}\nenddocinfo&userName={}&",
        escape(user),
        escape(user)
    )
}

pub fn notloggedin_response(conn_id: u64) -> String {
    format!("notloggedin&id={conn_id}&")
}

pub fn loggedout_response(user: &str) -> String {
    format!("loggedout&userName={}&", escape(user))
}

pub fn created_response(user: &str, doc: &str, date: &str) -> String {
    format!(
        "created&userName={}&docName={}&date={}&",
        escape(user),
        escape(doc),
        escape(date)
    )
}

pub fn notcreatedduplicate_response(user: &str) -> String {
    format!("notcreatedduplicate&userName={}&", escape(user))
}

#[allow(clippy::too_many_arguments)]
pub fn update_opened_response(
    user: &str,
    doc: &str,
    collaborators: &str,
    colors: &str,
    version: u64,
    chat: &str,
    content: &str,
) -> String {
    format!(
        "update&docName={}&collaborators={}&colors={}&\n\
         opened&userName={}&docName={}&collaborators={}&version={version}&colors={}&chatContent={}&docContent={}&",
        escape(doc),
        escape(collaborators),
        escape(colors),
        escape(user),
        escape(doc),
        escape(collaborators),
        escape(colors),
        escape(chat),
        escape(content),
    )
}

#[allow(clippy::too_many_arguments)]
pub fn changed_insertion_response(
    user: &str,
    doc: &str,
    position: usize,
    length: usize,
    version: u64,
    color: &str,
    change: &str,
) -> String {
    format!(
        "changed&type=insertion&userName={}&docName={}&position={position}&length={length}&version={version}&color={}&change={}&",
        escape(user),
        escape(doc),
        escape(color),
        escape(change),
    )
}

pub fn changed_deletion_response(
    user: &str,
    doc: &str,
    position: usize,
    length: usize,
    version: u64,
) -> String {
    format!(
        "changed&type=deletion&userName={}&docName={}&position={position}&length={length}&version={version}&",
        escape(user),
        escape(doc),
    )
}

pub fn chat_response(user: &str, doc: &str, content: &str) -> String {
    format!(
        "chat&userName={}&docName={}&chatContent={}&",
        escape(user),
        escape(doc),
        escape(content)
    )
}

pub fn corrected_response(user: &str, doc: &str, content: &str) -> String {
    format!(
        "corrected&userName={}&docName={}&content={}&",
        escape(user),
        escape(doc),
        escape(content)
    )
}

pub fn exiteddoc_response(user: &str, doc: &str, docinfo: &str) -> String {
    if docinfo.is_empty() {
        return format!(
            "exiteddoc&userName={}&docName={}&\nenddocinfo&userName={}&",
            escape(user),
            escape(doc),
            escape(user)
        );
    }
    format!(
        "exiteddoc&userName={}&docName={}&\n{docinfo}\nenddocinfo&userName={}&",
        escape(user),
        escape(doc),
        escape(user)
    )
}

pub fn docinfo_line(doc: &str, date: &str, collab: &str, user: &str) -> String {
    format!(
        "docinfo&docName={}&date={}&collab={}&userName={}&",
        escape(doc),
        escape(date),
        escape(collab),
        escape(user)
    )
}

//! DBGp proxy wire formats
//!
//! Two formats share the null byte as terminator:
//!
//! ```text
//! // IDE -> registry (one request per connection)
//! proxyinit -k <idekey> -p <port>\0
//! proxystop -k <idekey>\0
//!
//! // registry -> IDE
//! <proxyinit success="1" idekey="ABC"/>
//! <proxyinit success="0" idekey="ABC"><error><message>...</message></error></proxyinit>
//!
//! // debugger engine -> relay (first message only)
//! <length>\0<?xml ... ?><init ... idekey="ABC" ...>...</init>\0
//! ```

use std::borrow::Cow;
use std::fmt::Display;

use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::{ProxyError, Result};

pub const CMD_INIT: &str = "proxyinit";
pub const CMD_STOP: &str = "proxystop";

/// Segment terminator on both channels
pub const TERMINATOR: u8 = 0;

/// Longest segment read before giving up on a terminator
pub const MAX_SEGMENT_LEN: u64 = 1024 * 1024;

/// A parsed registry control command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingCommand {
    Init { idekey: String, port: String },
    Stop { idekey: String },
}

impl RoutingCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init { .. } => CMD_INIT,
            Self::Stop { .. } => CMD_STOP,
        }
    }

    pub fn idekey(&self) -> &str {
        match self {
            Self::Init { idekey, .. } | Self::Stop { idekey } => idekey,
        }
    }

    /// Parse `<command> -k <idekey> [-p <port>]`.
    ///
    /// On failure the error carries whatever command name and idekey were
    /// recovered so the caller can still address its reply.
    pub fn parse(line: &str) -> std::result::Result<Self, CommandError> {
        let command = line
            .split(char::is_whitespace)
            .next()
            .unwrap_or_default()
            .to_string();
        if !is_xml_name(&command) {
            return Err(CommandError::new("", "", ProxyError::CommandParse { what: "command" }));
        }

        let idekey = match flag_value(line, "-k") {
            Some(idekey) => idekey.to_string(),
            None => {
                return Err(CommandError::new(
                    &command,
                    "",
                    ProxyError::CommandParse { what: "idekey" },
                ))
            }
        };

        match command.as_str() {
            CMD_INIT => {
                let port = flag_value(line, "-p")
                    .filter(|p| p.parse::<u16>().is_ok())
                    .ok_or_else(|| {
                        CommandError::new(&command, &idekey, ProxyError::CommandParse { what: "port" })
                    })?;
                Ok(Self::Init {
                    idekey,
                    port: port.to_string(),
                })
            }
            CMD_STOP => Ok(Self::Stop { idekey }),
            _ => Err(CommandError::new(
                &command,
                &idekey,
                ProxyError::UnknownCommand {
                    command: command.clone(),
                },
            )),
        }
    }
}

/// Whether `name` can be used as a reply element name
fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' || first == ':' => chars
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '.' | '_' | ':')),
        _ => false,
    }
}

/// Value of the token following `flag`, if any
fn flag_value<'a>(line: &'a str, flag: &str) -> Option<&'a str> {
    let mut tokens = line.split_whitespace().skip(1);
    while let Some(token) = tokens.next() {
        if token == flag {
            return tokens.next();
        }
    }
    None
}

/// A command that failed to parse, with the parts recovered before the failure
#[derive(Debug)]
pub struct CommandError {
    pub command: String,
    pub idekey: String,
    pub error: ProxyError,
}

impl CommandError {
    fn new(command: &str, idekey: &str, error: ProxyError) -> Self {
        Self {
            command: command.to_string(),
            idekey: idekey.to_string(),
            error,
        }
    }

    /// Best-effort reply for the requester. Unknown or missing command names
    /// get none.
    pub fn reply(&self) -> Option<RegistryReply> {
        if self.command.is_empty() || matches!(self.error, ProxyError::UnknownCommand { .. }) {
            return None;
        }
        Some(RegistryReply::failure(
            &self.command,
            &self.idekey,
            self.error.to_string(),
        ))
    }
}

/// Registry response document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryReply {
    pub command: String,
    pub idekey: String,
    pub error: Option<String>,
}

impl RegistryReply {
    pub fn success(command: &str, idekey: &str) -> Self {
        Self {
            command: command.to_string(),
            idekey: idekey.to_string(),
            error: None,
        }
    }

    pub fn failure(command: &str, idekey: &str, message: impl Into<String>) -> Self {
        Self {
            command: command.to_string(),
            idekey: idekey.to_string(),
            error: Some(message.into()),
        }
    }

    /// Build a reply from a response message, empty meaning success
    pub fn with_message(command: &str, idekey: &str, message: &str) -> Self {
        if message.is_empty() {
            Self::success(command, idekey)
        } else {
            Self::failure(command, idekey, message)
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Render the reply as XML. The element name mirrors the command.
    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        let mut root = BytesStart::new(self.command.as_str());
        root.push_attribute(("success", if self.is_success() { "1" } else { "0" }));
        root.push_attribute(("idekey", self.idekey.as_str()));

        match &self.error {
            None => writer.write_event(Event::Empty(root)).map_err(xml_err)?,
            Some(message) => {
                writer.write_event(Event::Start(root)).map_err(xml_err)?;
                writer
                    .write_event(Event::Start(BytesStart::new("error")))
                    .map_err(xml_err)?;
                writer
                    .write_event(Event::Start(BytesStart::new("message")))
                    .map_err(xml_err)?;
                writer
                    .write_event(Event::Text(BytesText::new(message)))
                    .map_err(xml_err)?;
                writer
                    .write_event(Event::End(BytesEnd::new("message")))
                    .map_err(xml_err)?;
                writer
                    .write_event(Event::End(BytesEnd::new("error")))
                    .map_err(xml_err)?;
                writer
                    .write_event(Event::End(BytesEnd::new(self.command.as_str())))
                    .map_err(xml_err)?;
            }
        }
        Ok(writer.into_inner())
    }

    /// Parse a reply document, as an IDE would
    pub fn from_xml(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let decoder = reader.decoder();
        let mut reply: Option<Self> = None;
        let mut success = false;
        let mut in_message = false;

        loop {
            match reader.read_event().map_err(xml_err)? {
                Event::Start(e) | Event::Empty(e) if reply.is_none() => {
                    let command = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    success = attribute(&e, "success", decoder)?.as_deref() == Some("1");
                    let idekey = attribute(&e, "idekey", decoder)?.unwrap_or_default();
                    reply = Some(Self::success(&command, &idekey));
                }
                Event::Start(e) if e.name().as_ref() == b"message" => in_message = true,
                Event::End(e) if e.name().as_ref() == b"message" => in_message = false,
                Event::Text(t) if in_message => {
                    let text = t.unescape().map_err(xml_err)?;
                    if let Some(reply) = reply.as_mut() {
                        reply.error.get_or_insert_with(String::new).push_str(&text);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let mut reply = reply.ok_or_else(|| ProxyError::Xml {
            message: "reply has no root element".to_string(),
        })?;
        if !success && reply.error.is_none() {
            reply.error = Some(String::new());
        }
        Ok(reply)
    }
}

fn attribute(element: &BytesStart<'_>, name: &str, decoder: Decoder) -> Result<Option<String>> {
    match element.try_get_attribute(name).map_err(xml_err)? {
        Some(attr) => Ok(Some(
            attr.decode_and_unescape_value(decoder)
                .map_err(xml_err)?
                .into_owned(),
        )),
        None => Ok(None),
    }
}

fn xml_err(e: impl Display) -> ProxyError {
    ProxyError::Xml {
        message: e.to_string(),
    }
}

/// Bytes read up to and including a terminator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segment {
    pub bytes: Vec<u8>,
    /// False when the stream ended before a terminator arrived
    pub terminated: bool,
}

impl Segment {
    /// Segment content without its terminator
    pub fn payload(&self) -> &[u8] {
        if self.terminated {
            &self.bytes[..self.bytes.len() - 1]
        } else {
            &self.bytes
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Read one null-terminated segment.
///
/// End of stream before the terminator is not an error: whatever was read is
/// returned with `terminated == false`. The same goes for a segment that
/// reaches [`MAX_SEGMENT_LEN`] without a terminator.
pub async fn read_segment<R>(reader: &mut R) -> Result<Segment>
where
    R: AsyncBufRead + Unpin,
{
    read_segment_limited(reader, MAX_SEGMENT_LEN).await
}

pub async fn read_segment_limited<R>(reader: &mut R, limit: u64) -> Result<Segment>
where
    R: AsyncBufRead + Unpin,
{
    let mut bytes = Vec::new();
    (&mut *reader)
        .take(limit)
        .read_until(TERMINATOR, &mut bytes)
        .await?;
    let terminated = bytes.last() == Some(&TERMINATOR);
    if !terminated {
        if bytes.len() as u64 >= limit {
            tracing::warn!("Segment exceeds {} bytes without terminator", limit);
        } else {
            tracing::warn!(
                "Stream ended before segment terminator ({} bytes read)",
                bytes.len()
            );
        }
    }
    Ok(Segment { bytes, terminated })
}

/// First message of a debugger engine: length segment, then the init document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitPacket {
    pub length: Segment,
    pub document: Segment,
}

impl InitPacket {
    pub async fn read<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncBufRead + Unpin,
    {
        let length = read_segment(reader).await?;
        let document = if length.terminated {
            read_segment(reader).await?
        } else {
            Segment::default()
        };
        Ok(Self { length, document })
    }

    /// Exact bytes received, to be replayed to the IDE
    pub fn raw(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(self.length.bytes.len() + self.document.bytes.len());
        raw.extend_from_slice(&self.length.bytes);
        raw.extend_from_slice(&self.document.bytes);
        raw
    }

    /// Routing key of this session, empty when the document can't be decoded
    pub fn idekey(&self) -> String {
        match extract_idekey(self.document.payload()) {
            Ok(idekey) => idekey,
            Err(e) => {
                tracing::warn!("Can't read idekey from init packet: {}", e);
                String::new()
            }
        }
    }
}

/// Read the `idekey` attribute of the root element of an init document.
///
/// The document's declared encoding selects the decoder for attribute values.
/// The whole root element must be well formed, not just its start tag.
pub fn extract_idekey(document: &[u8]) -> Result<String> {
    let mut reader = Reader::from_reader(document);
    let mut buf = Vec::new();
    let mut idekey: Option<String> = None;
    let mut root: Vec<u8> = Vec::new();
    let mut depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Decl(decl) => {
                let encoding: Option<&'static encoding_rs::Encoding> = decl.encoder();
                if let Some(encoding) = encoding {
                    tracing::debug!("Init packet declares encoding {}", encoding.name());
                }
            }
            Event::Start(e) if idekey.is_none() => {
                idekey = Some(root_idekey(&e, reader.decoder())?);
                root = e.name().as_ref().to_vec();
                depth = 1;
            }
            Event::Empty(e) if idekey.is_none() => {
                return root_idekey(&e, reader.decoder());
            }
            Event::Start(_) => depth += 1,
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if e.name().as_ref() != root.as_slice() {
                        return Err(ProxyError::Xml {
                            message: "root element is not closed".to_string(),
                        });
                    }
                    if let Some(idekey) = idekey {
                        return Ok(idekey);
                    }
                }
            }
            Event::Eof => {
                let message = if idekey.is_some() {
                    "init packet ends inside the root element"
                } else {
                    "init packet has no root element"
                };
                return Err(ProxyError::Xml {
                    message: message.to_string(),
                });
            }
            _ => {}
        }
        buf.clear();
    }
}

fn root_idekey(root: &BytesStart<'_>, decoder: Decoder) -> Result<String> {
    let attr = root
        .try_get_attribute("idekey")
        .map_err(xml_err)?
        .ok_or_else(|| ProxyError::Xml {
            message: "root element has no idekey attribute".to_string(),
        })?;
    let value: Cow<'_, str> = attr.decode_and_unescape_value(decoder).map_err(xml_err)?;
    Ok(value.into_owned())
}

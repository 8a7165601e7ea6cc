// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// IPP message encoding and decoding on top of the `ipp` crate.
//
// Requests are built fresh for every call and encoded once per attempt with
// that attempt's request-id.  Only the attribute section is held in memory;
// a document follows it on the wire straight from its file (`RequestBody`).
// Replies are parsed with `IppParser` and queried by attribute name through
// `AttributeLookup`.

use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

pub use ipp::prelude::{DelimiterTag, IppAttribute, IppAttributeGroup, IppValue, Operation};
use ipp::parser::IppParser;
use ipp::prelude::{IppAttributes, IppHeader, IppRequestResponse, IppVersion};

use spoolgate_core::error::{Result, SpoolgateError};
use spoolgate_core::types::StatusCode;

/// Largest name or value an attribute can carry (16-bit length field).
const MAX_FIELD_BYTES: usize = u16::MAX as usize;

// ---------------------------------------------------------------------------
// Attribute lookup
// ---------------------------------------------------------------------------

/// String content of any string-typed value.  Multi-valued attributes
/// answer with their first value.
pub fn value_str(value: &IppValue) -> Option<&str> {
    match value {
        IppValue::TextWithoutLanguage(s)
        | IppValue::NameWithoutLanguage(s)
        | IppValue::Keyword(s)
        | IppValue::Uri(s)
        | IppValue::Charset(s)
        | IppValue::NaturalLanguage(s)
        | IppValue::MimeMediaType(s) => Some(s.as_str()),
        IppValue::TextWithLanguage { text, .. } => Some(text.as_str()),
        IppValue::NameWithLanguage { name, .. } => Some(name.as_str()),
        IppValue::Array(values) => values.first().and_then(value_str),
        _ => None,
    }
}

fn value_i32(value: &IppValue) -> Option<i32> {
    match value {
        IppValue::Integer(v) | IppValue::Enum(v) => Some(*v),
        IppValue::Array(values) => values.first().and_then(value_i32),
        _ => None,
    }
}

fn value_bool(value: &IppValue) -> Option<bool> {
    match value {
        IppValue::Boolean(v) => Some(*v),
        IppValue::Array(values) => values.first().and_then(value_bool),
        _ => None,
    }
}

/// Every value of a 1setOf, or the single value otherwise.
fn each_value(value: &IppValue) -> &[IppValue] {
    match value {
        IppValue::Array(values) => values,
        single => std::slice::from_ref(single),
    }
}

/// Typed lookups by attribute name within one group.
pub trait AttributeLookup {
    /// First value of the named attribute as a string.
    fn get_string(&self, name: &str) -> Option<&str>;

    /// First value of the named attribute as an integer or enum.
    fn get_integer(&self, name: &str) -> Option<i32>;

    fn get_bool(&self, name: &str) -> Option<bool>;

    /// All string values of the named attribute.
    fn get_strings(&self, name: &str) -> Vec<&str>;
}

impl AttributeLookup for IppAttributeGroup {
    fn get_string(&self, name: &str) -> Option<&str> {
        self.attributes().get(name).and_then(|a| value_str(a.value()))
    }

    fn get_integer(&self, name: &str) -> Option<i32> {
        self.attributes().get(name).and_then(|a| value_i32(a.value()))
    }

    fn get_bool(&self, name: &str) -> Option<bool> {
        self.attributes().get(name).and_then(|a| value_bool(a.value()))
    }

    fn get_strings(&self, name: &str) -> Vec<&str> {
        self.attributes()
            .get(name)
            .map(|a| each_value(a.value()).iter().filter_map(value_str).collect())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// An IPP request ready to be encoded.
pub struct IppRequest {
    operation_id: u16,
    operation_name: String,
    message: IppRequestResponse,
}

impl IppRequest {
    /// New IPP/2.0 request with `attributes-charset` and
    /// `attributes-natural-language` in place.
    pub fn new(operation: Operation) -> Self {
        let operation_name = format!("{operation:?}");
        let message = IppRequestResponse::new(IppVersion::v2_0(), operation, None);
        Self {
            operation_id: message.header().operation_or_status,
            operation_name,
            message,
        }
    }

    pub fn operation_id(&self) -> u16 {
        self.operation_id
    }

    /// Operation name for logs, e.g. `CupsGetPrinters`.
    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    pub fn attributes(&self) -> &IppAttributes {
        self.message.attributes()
    }

    /// Add a single-valued operation attribute.
    pub fn add_operation(&mut self, name: &str, value: IppValue) -> &mut Self {
        self.add(DelimiterTag::OperationAttributes, name, value)
    }

    /// Add a multi-valued operation attribute.  An empty list adds nothing.
    pub fn add_operation_values(&mut self, name: &str, mut values: Vec<IppValue>) -> &mut Self {
        match values.len() {
            0 => self,
            1 => {
                let value = values.remove(0);
                self.add(DelimiterTag::OperationAttributes, name, value)
            }
            _ => self.add(DelimiterTag::OperationAttributes, name, IppValue::Array(values)),
        }
    }

    /// Add a single-valued job template attribute.
    pub fn add_job(&mut self, name: &str, value: IppValue) -> &mut Self {
        self.add(DelimiterTag::JobAttributes, name, value)
    }

    fn add(&mut self, tag: DelimiterTag, name: &str, value: IppValue) -> &mut Self {
        self.message
            .attributes_mut()
            .add(tag, IppAttribute::new(name, value));
        self
    }

    /// Encode the header and attribute section with the given request-id.
    pub fn encode(&self, request_id: u32) -> Result<Vec<u8>> {
        encode_message(self.operation_id, request_id, self.message.attributes())
    }
}

impl fmt::Debug for IppRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IppRequest")
            .field("operation", &self.operation_name)
            .field("groups", &self.message.attributes().groups().len())
            .finish()
    }
}

fn encode_message(
    operation_or_status: u16,
    request_id: u32,
    attributes: &IppAttributes,
) -> Result<Vec<u8>> {
    check_lengths(attributes)?;
    let header = IppHeader::new(IppVersion::v2_0(), operation_or_status, request_id);
    let mut buf = header.to_bytes().to_vec();
    buf.extend_from_slice(&attributes.to_bytes());
    Ok(buf)
}

/// Names and values are length-prefixed with 16 bits on the wire.
fn check_lengths(attributes: &IppAttributes) -> Result<()> {
    for group in attributes.groups() {
        for (name, attribute) in group.attributes() {
            if name.len() > MAX_FIELD_BYTES {
                return Err(SpoolgateError::Protocol(format!(
                    "attribute name too long: {} bytes",
                    name.len()
                )));
            }
            let oversized = each_value(attribute.value())
                .iter()
                .filter_map(value_str)
                .any(|s| s.len() > MAX_FIELD_BYTES);
            if oversized {
                return Err(SpoolgateError::Protocol(format!(
                    "value of '{name}' exceeds {MAX_FIELD_BYTES} bytes"
                )));
            }
        }
    }
    Ok(())
}

/// What one attempt sends: the encoded attribute section, then the document
/// (if any) copied from its file.  Can be written more than once.
#[derive(Debug)]
pub struct RequestBody {
    attributes: Vec<u8>,
    document: Option<Document>,
}

#[derive(Debug)]
struct Document {
    file: File,
    len: u64,
}

impl RequestBody {
    pub fn new(attributes: Vec<u8>) -> Self {
        Self {
            attributes,
            document: None,
        }
    }

    /// Attribute section followed by the whole of `file`.
    pub fn with_document(attributes: Vec<u8>, file: File) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self {
            attributes,
            document: Some(Document { file, len }),
        })
    }

    pub fn attributes(&self) -> &[u8] {
        &self.attributes
    }

    /// Total bytes on the wire (the `Content-Length`).
    pub fn len(&self) -> u64 {
        self.attributes.len() as u64 + self.document.as_ref().map_or(0, |d| d.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the whole body, rewinding the document first.  Fails if the
    /// file no longer holds the length it had when the body was built.
    pub fn write_to(&mut self, w: &mut dyn Write) -> io::Result<u64> {
        w.write_all(&self.attributes)?;
        let mut written = self.attributes.len() as u64;
        if let Some(document) = self.document.as_mut() {
            document.file.seek(SeekFrom::Start(0))?;
            let copied = io::copy(&mut (&mut document.file).take(document.len), w)?;
            if copied < document.len {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("document ended after {copied} of {} bytes", document.len),
                ));
            }
            written += copied;
        }
        Ok(written)
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// A decoded IPP response.  Dropping it releases it.
pub struct IppResponse {
    status: StatusCode,
    request_id: u32,
    attributes: IppAttributes,
}

impl IppResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    pub fn attributes(&self) -> &IppAttributes {
        &self.attributes
    }

    /// All groups with the given delimiter, in order.
    pub fn groups_of(&self, tag: DelimiterTag) -> impl Iterator<Item = &IppAttributeGroup> {
        self.attributes
            .groups()
            .iter()
            .filter(move |g| g.tag() == tag)
    }

    pub fn operation_attributes(&self) -> Option<&IppAttributeGroup> {
        self.groups_of(DelimiterTag::OperationAttributes).next()
    }

    /// The server's `status-message`, if present.
    pub fn status_message(&self) -> Option<&str> {
        self.operation_attributes()
            .and_then(|g| g.get_string("status-message"))
    }

    /// First attribute with the given name in any group.
    pub fn find(&self, name: &str) -> Option<&IppAttribute> {
        self.attributes
            .groups()
            .iter()
            .find_map(|g| g.attributes().get(name))
    }
}

impl fmt::Debug for IppResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IppResponse")
            .field("status", &self.status)
            .field("request_id", &self.request_id)
            .field("groups", &self.attributes.groups().len())
            .finish()
    }
}

/// Decode a raw IPP message.  A request parses the same way; its operation
/// id lands in the status slot.
pub fn decode_response(data: &[u8]) -> Result<IppResponse> {
    let (header, attributes, _payload) = IppParser::new(Cursor::new(data.to_vec()))
        .parse_parts()
        .map_err(|e| SpoolgateError::Protocol(e.to_string()))?;
    Ok(IppResponse {
        status: StatusCode(header.operation_or_status),
        request_id: header.request_id,
        attributes,
    })
}

// ---------------------------------------------------------------------------
// Response builder (stand-in servers, tests and benches)
// ---------------------------------------------------------------------------

/// Builds encoded IPP responses, the server-side counterpart of
/// [`IppRequest::encode`].
pub struct ResponseBuilder {
    status: StatusCode,
    request_id: u32,
    attributes: IppAttributes,
}

impl ResponseBuilder {
    /// Response with the standard operation group: charset, language and
    /// `status-message`.
    pub fn new(status: StatusCode, request_id: u32, message: &str) -> Self {
        let mut attributes = IppAttributes::new();
        for attribute in [
            IppAttribute::new("attributes-charset", IppValue::Charset("utf-8".into())),
            IppAttribute::new(
                "attributes-natural-language",
                IppValue::NaturalLanguage("en".into()),
            ),
            IppAttribute::new(
                "status-message",
                IppValue::TextWithoutLanguage(message.to_string()),
            ),
        ] {
            attributes.add(DelimiterTag::OperationAttributes, attribute);
        }
        Self {
            status,
            request_id,
            attributes,
        }
    }

    /// Start a new group; following attributes go into it.
    pub fn begin_group(&mut self, tag: DelimiterTag) -> &mut Self {
        self.attributes.groups_mut().push(IppAttributeGroup::new(tag));
        self
    }

    /// Add an attribute to the current group.
    pub fn attr(&mut self, name: &str, value: IppValue) -> &mut Self {
        let attribute = IppAttribute::new(name, value);
        match self.attributes.groups_mut().last_mut() {
            Some(group) => {
                group.attributes_mut().insert(name.to_string(), attribute);
            }
            None => self.attributes.add(DelimiterTag::OperationAttributes, attribute),
        }
        self
    }

    /// Encode the response.  Oversized names or values are an error.
    pub fn build(&self) -> Result<Vec<u8>> {
        encode_message(self.status.as_u16(), self.request_id, &self.attributes)
    }
}

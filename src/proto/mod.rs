//! Wire Protocol
//!
//! Defines the binary framing shared by the client and peer paths, plus the
//! opcode and status vocabularies.
//!
//! Request frame:  `OpCode(1) | KeyLen(4, BE) | Key | ValueLen(4, BE) | Value`
//! Response frame: `Status(1) | ValueLen(4, BE) | Value`
//!
//! Identifier arguments travel as the 20 raw digest bytes in the Key field;
//! peer arguments and results travel as ASCII `"address:port"` in the Value
//! field. A `REDIRECT` response carries the responsible node the same way.


use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on any key or value field. An inbound length prefix above this
/// is treated as a framing error and the connection is dropped.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Sub-operation tag carried in the first Value byte of a `REPLICATE` frame.
/// The tag keeps a replicated write of an empty value distinguishable from a
/// replicated delete.
pub const REPLICA_PUT: u8 = 0x00;
pub const REPLICA_DELETE: u8 = 0x01;

/// Operation selector, the first byte of every request frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Get = 0x01,
    Put = 0x02,
    Delete = 0x03,
    Join = 0x10,
    Stabilize = 0x11,
    Notify = 0x12,
    Ping = 0x13,
    Replicate = 0x14,
    FindSuccessor = 0x20,
    FindPredecessor = 0x21,
    GetPredecessor = 0x22,
    GetSuccessor = 0x23,
    ClosestPreceding = 0x24,
    NodeInfo = 0x25,
    TransferKey = 0x26,
    AdminShutdown = 0xFF,
}

impl OpCode {
    pub fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            0x01 => OpCode::Get,
            0x02 => OpCode::Put,
            0x03 => OpCode::Delete,
            0x10 => OpCode::Join,
            0x11 => OpCode::Stabilize,
            0x12 => OpCode::Notify,
            0x13 => OpCode::Ping,
            0x14 => OpCode::Replicate,
            0x20 => OpCode::FindSuccessor,
            0x21 => OpCode::FindPredecessor,
            0x22 => OpCode::GetPredecessor,
            0x23 => OpCode::GetSuccessor,
            0x24 => OpCode::ClosestPreceding,
            0x25 => OpCode::NodeInfo,
            0x26 => OpCode::TransferKey,
            0xFF => OpCode::AdminShutdown,
            _ => return None,
        })
    }
}

/// Outcome of a request, the first byte of every response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Success = 0x00,
    KeyNotFound = 0x01,
    Error = 0x02,
    Redirect = 0x03,
}

impl Status {
    pub fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            0x00 => Status::Success,
            0x01 => Status::KeyNotFound,
            0x02 => Status::Error,
            0x03 => Status::Redirect,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub opcode: OpCode,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Request {
    pub fn new(opcode: OpCode, key: Vec<u8>, value: Vec<u8>) -> Self {
        Self { opcode, key, value }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub value: Vec<u8>,
}

impl Response {
    pub fn new(status: Status, value: Vec<u8>) -> Self {
        Self { status, value }
    }

    pub fn ok() -> Self {
        Self::new(Status::Success, Vec::new())
    }

    pub fn success(value: Vec<u8>) -> Self {
        Self::new(Status::Success, value)
    }

    pub fn key_not_found() -> Self {
        Self::new(Status::KeyNotFound, Vec::new())
    }

    pub fn error() -> Self {
        Self::new(Status::Error, Vec::new())
    }

    pub fn redirect(endpoint: &str) -> Self {
        Self::new(Status::Redirect, endpoint.as_bytes().to_vec())
    }
}

/// Framing failures. Any of these closes the offending connection.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("unknown opcode {0:#04x}")]
    UnknownOpCode(u8),
    #[error("unknown status {0:#04x}")]
    UnknownStatus(u8),
    #[error("field of {0} bytes exceeds the frame limit")]
    Oversized(usize),
    #[error("truncated frame")]
    Truncated,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn check_len(len: usize) -> Result<usize, FrameError> {
    if len > MAX_FRAME_BYTES {
        Err(FrameError::Oversized(len))
    } else {
        Ok(len)
    }
}

fn write_field(buffer: &mut Vec<u8>, field: &[u8]) {
    buffer.extend_from_slice(&(field.len() as u32).to_be_bytes());
    buffer.extend_from_slice(field);
}

fn read_field(data: &[u8], offset: &mut usize) -> Result<Vec<u8>, FrameError> {
    if data.len() < *offset + 4 {
        return Err(FrameError::Truncated);
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&data[*offset..*offset + 4]);
    let len = check_len(u32::from_be_bytes(len_bytes) as usize)?;
    *offset += 4;
    if data.len() < *offset + len {
        return Err(FrameError::Truncated);
    }
    let field = data[*offset..*offset + len].to_vec();
    *offset += len;
    Ok(field)
}

pub fn encode_request(request: &Request) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(9 + request.key.len() + request.value.len());
    buffer.push(request.opcode as u8);
    write_field(&mut buffer, &request.key);
    write_field(&mut buffer, &request.value);
    buffer
}

pub fn decode_request(data: &[u8]) -> Result<Request, FrameError> {
    let opcode_byte = *data.first().ok_or(FrameError::Truncated)?;
    let opcode = OpCode::from_u8(opcode_byte).ok_or(FrameError::UnknownOpCode(opcode_byte))?;
    let mut offset = 1;
    let key = read_field(data, &mut offset)?;
    let value = read_field(data, &mut offset)?;
    Ok(Request { opcode, key, value })
}

pub fn encode_response(response: &Response) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(5 + response.value.len());
    buffer.push(response.status as u8);
    write_field(&mut buffer, &response.value);
    buffer
}

pub fn decode_response(data: &[u8]) -> Result<Response, FrameError> {
    let status_byte = *data.first().ok_or(FrameError::Truncated)?;
    let status = Status::from_u8(status_byte).ok_or(FrameError::UnknownStatus(status_byte))?;
    let mut offset = 1;
    let value = read_field(data, &mut offset)?;
    Ok(Response { status, value })
}

async fn read_sized<R>(stream: &mut R) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).await?;
    let len = check_len(u32::from_be_bytes(len_bytes) as usize)?;
    let mut field = vec![0u8; len];
    stream.read_exact(&mut field).await?;
    Ok(field)
}

/// Reads one request frame from the stream.
pub async fn read_request<R>(stream: &mut R) -> Result<Request, FrameError>
where
    R: AsyncRead + Unpin,
{
    let opcode_byte = stream.read_u8().await?;
    let opcode = OpCode::from_u8(opcode_byte).ok_or(FrameError::UnknownOpCode(opcode_byte))?;
    let key = read_sized(stream).await?;
    let value = read_sized(stream).await?;
    Ok(Request { opcode, key, value })
}

pub async fn write_request<W>(stream: &mut W, request: &Request) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    stream.write_all(&encode_request(request)).await?;
    stream.flush().await?;
    Ok(())
}

/// Reads one response frame from the stream.
pub async fn read_response<R>(stream: &mut R) -> Result<Response, FrameError>
where
    R: AsyncRead + Unpin,
{
    let status_byte = stream.read_u8().await?;
    let status = Status::from_u8(status_byte).ok_or(FrameError::UnknownStatus(status_byte))?;
    let value = read_sized(stream).await?;
    Ok(Response { status, value })
}

pub async fn write_response<W>(stream: &mut W, response: &Response) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    stream.write_all(&encode_response(response)).await?;
    stream.flush().await?;
    Ok(())
}

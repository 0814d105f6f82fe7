//! Parsers for frontend (client → server) messages.
//!
//! These take ownership of the already-fully-read payload produced by
//! [`super::codec::read_typed`]/[`super::codec::read_untyped`] and turn it
//! into a typed value; they never touch the socket themselves.

use bytes::{Buf, BytesMut};
use std::collections::HashMap;

use crate::errors::{Error, ProtocolError};

use super::codec::get_cstr;

/// The parsed body of a `StartupMessage`, after the protocol-version
/// code has already been consumed by the caller.
#[derive(Debug, Clone)]
pub struct StartupParams {
    pub params: HashMap<String, String>,
}

impl StartupParams {
    pub fn parse(mut payload: BytesMut) -> Result<Self, Error> {
        let mut params = HashMap::new();
        while !payload.is_empty() {
            let key = get_cstr(&mut payload)?;
            if key.is_empty() {
                break;
            }
            let value = get_cstr(&mut payload)?;
            params.insert(key, value);
        }
        Ok(StartupParams { params })
    }

    pub fn user(&self) -> Result<&str, Error> {
        self.params
            .get("user")
            .map(String::as_str)
            .ok_or_else(|| ProtocolError::MissingUser.into())
    }

    pub fn database(&self) -> &str {
        self.params
            .get("database")
            .map(String::as_str)
            .unwrap_or_else(|| self.params.get("user").map(String::as_str).unwrap_or(""))
    }
}

/// The parsed body of a `CancelRequest` (after the request code).
#[derive(Debug, Clone, Copy)]
pub struct CancelRequest {
    pub backend_pid: i32,
    pub secret_key: i32,
}

impl CancelRequest {
    pub fn parse(mut payload: BytesMut) -> Result<Self, Error> {
        if payload.len() < 8 {
            return Err(ProtocolError::MalformedPayload("short CancelRequest".into()).into());
        }
        Ok(CancelRequest {
            backend_pid: payload.get_i32(),
            secret_key: payload.get_i32(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Query {
    pub sql: String,
}

impl Query {
    pub fn parse(mut payload: BytesMut) -> Result<Self, Error> {
        Ok(Query {
            sql: get_cstr(&mut payload)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Parse {
    pub statement: String,
    pub sql: String,
    pub param_type_oids: Vec<i32>,
}

impl Parse {
    pub fn parse(mut payload: BytesMut) -> Result<Self, Error> {
        let statement = get_cstr(&mut payload)?;
        let sql = get_cstr(&mut payload)?;
        require(&payload, 2)?;
        let count = payload.get_i16() as usize;
        require(&payload, count * 4)?;
        let param_type_oids = (0..count).map(|_| payload.get_i32()).collect();
        Ok(Parse {
            statement,
            sql,
            param_type_oids,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Bind {
    pub portal: String,
    pub statement: String,
    pub param_format_codes: Vec<i16>,
    pub params: Vec<Option<Vec<u8>>>,
    pub result_format_codes: Vec<i16>,
}

impl Bind {
    pub fn parse(mut payload: BytesMut) -> Result<Self, Error> {
        let portal = get_cstr(&mut payload)?;
        let statement = get_cstr(&mut payload)?;

        require(&payload, 2)?;
        let format_count = payload.get_i16() as usize;
        require(&payload, format_count * 2)?;
        let param_format_codes = (0..format_count).map(|_| payload.get_i16()).collect();

        require(&payload, 2)?;
        let param_count = payload.get_i16() as usize;
        let mut params = Vec::with_capacity(param_count);
        for _ in 0..param_count {
            require(&payload, 4)?;
            let len = payload.get_i32();
            if len < 0 {
                params.push(None);
            } else {
                require(&payload, len as usize)?;
                params.push(Some(payload.split_to(len as usize).to_vec()));
            }
        }

        require(&payload, 2)?;
        let result_count = payload.get_i16() as usize;
        require(&payload, result_count * 2)?;
        let result_format_codes = (0..result_count).map(|_| payload.get_i16()).collect();

        Ok(Bind {
            portal,
            statement,
            param_format_codes,
            params,
            result_format_codes,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescribeTarget {
    Statement,
    Portal,
}

#[derive(Debug, Clone)]
pub struct Describe {
    pub target: DescribeTarget,
    pub name: String,
}

impl Describe {
    pub fn parse(mut payload: BytesMut) -> Result<Self, Error> {
        require(&payload, 1)?;
        let target = match payload.get_u8() {
            super::constants::target::STATEMENT => DescribeTarget::Statement,
            super::constants::target::PORTAL => DescribeTarget::Portal,
            other => {
                return Err(
                    ProtocolError::MalformedPayload(format!("bad Describe target {other}")).into(),
                )
            }
        };
        Ok(Describe {
            target,
            name: get_cstr(&mut payload)?,
        })
    }
}

pub type Close = Describe;

#[derive(Debug, Clone)]
pub struct Execute {
    pub portal: String,
    pub max_rows: i32,
}

impl Execute {
    pub fn parse(mut payload: BytesMut) -> Result<Self, Error> {
        let portal = get_cstr(&mut payload)?;
        require(&payload, 4)?;
        Ok(Execute {
            portal,
            max_rows: payload.get_i32(),
        })
    }
}

fn require(payload: &BytesMut, n: usize) -> Result<(), Error> {
    if payload.len() < n {
        Err(ProtocolError::MalformedPayload("truncated field".into()).into())
    } else {
        Ok(())
    }
}

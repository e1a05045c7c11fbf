//! STUN binding messages used for connectivity checks (RFC 5389 framing).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |0 0|     STUN Message Type     |         Message Length        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Magic Cookie                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Transaction ID (96 bits)                  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Message integrity and fingerprint attributes are not carried.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::{Buf, BufMut, BytesMut};
use rand::Rng;

use crate::error::{Error, Result};

pub(crate) const MAGIC_COOKIE: u32 = 0x2112_A442;
pub(crate) const MESSAGE_HEADER_SIZE: usize = 20;
pub(crate) const TRANSACTION_ID_SIZE: usize = 12;

const BINDING_REQUEST: u16 = 0x0001;
const BINDING_SUCCESS: u16 = 0x0101;

const ATTR_USERNAME: u16 = 0x0006;
const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;
const ATTR_PRIORITY: u16 = 0x0024;
const ATTR_USE_CANDIDATE: u16 = 0x0025;
const ATTR_ICE_CONTROLLED: u16 = 0x8029;
const ATTR_ICE_CONTROLLING: u16 = 0x802A;

const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

pub(crate) type TransactionId = [u8; TRANSACTION_ID_SIZE];

pub(crate) fn new_transaction_id() -> TransactionId {
    rand::rng().random()
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum BindingClass {
    Request,
    SuccessResponse,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum IceRoleAttr {
    Controlling(u64),
    Controlled(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BindingMessage {
    pub(crate) class: BindingClass,
    pub(crate) transaction_id: TransactionId,
    pub(crate) username: Option<String>,
    pub(crate) priority: Option<u32>,
    pub(crate) use_candidate: bool,
    pub(crate) role: Option<IceRoleAttr>,
    pub(crate) xor_mapped_address: Option<SocketAddr>,
}

impl BindingMessage {
    pub(crate) fn request(
        username: String,
        priority: u32,
        role: IceRoleAttr,
        use_candidate: bool,
    ) -> Self {
        BindingMessage {
            class: BindingClass::Request,
            transaction_id: new_transaction_id(),
            username: Some(username),
            priority: Some(priority),
            use_candidate,
            role: Some(role),
            xor_mapped_address: None,
        }
    }

    /// A success response for `request`, reflecting the address the request
    /// was received from.
    pub(crate) fn success(request: &BindingMessage, mapped: SocketAddr) -> Self {
        BindingMessage {
            class: BindingClass::SuccessResponse,
            transaction_id: request.transaction_id,
            username: None,
            priority: None,
            use_candidate: false,
            role: None,
            xor_mapped_address: Some(mapped),
        }
    }

    pub(crate) fn marshal(&self) -> BytesMut {
        let mut attrs = BytesMut::new();

        if let Some(username) = &self.username {
            put_attribute(&mut attrs, ATTR_USERNAME, username.as_bytes());
        }
        if let Some(priority) = self.priority {
            put_attribute(&mut attrs, ATTR_PRIORITY, &priority.to_be_bytes());
        }
        if self.use_candidate {
            put_attribute(&mut attrs, ATTR_USE_CANDIDATE, &[]);
        }
        match self.role {
            Some(IceRoleAttr::Controlling(tie_breaker)) => {
                put_attribute(&mut attrs, ATTR_ICE_CONTROLLING, &tie_breaker.to_be_bytes())
            }
            Some(IceRoleAttr::Controlled(tie_breaker)) => {
                put_attribute(&mut attrs, ATTR_ICE_CONTROLLED, &tie_breaker.to_be_bytes())
            }
            None => {}
        }
        if let Some(addr) = self.xor_mapped_address {
            let value = xor_address(addr, &self.transaction_id);
            put_attribute(&mut attrs, ATTR_XOR_MAPPED_ADDRESS, &value);
        }

        let mut out = BytesMut::with_capacity(MESSAGE_HEADER_SIZE + attrs.len());
        out.put_u16(match self.class {
            BindingClass::Request => BINDING_REQUEST,
            BindingClass::SuccessResponse => BINDING_SUCCESS,
        });
        out.put_u16(attrs.len() as u16);
        out.put_u32(MAGIC_COOKIE);
        out.put_slice(&self.transaction_id);
        out.put_slice(&attrs);
        out
    }

    pub(crate) fn unmarshal(raw: &[u8]) -> Result<Self> {
        if raw.len() < MESSAGE_HEADER_SIZE {
            return Err(Error::ErrBindingMessageTooShort(raw.len()));
        }

        let mut buf = raw;
        let typ = buf.get_u16();
        let class = match typ {
            BINDING_REQUEST => BindingClass::Request,
            BINDING_SUCCESS => BindingClass::SuccessResponse,
            _ => return Err(Error::ErrUnknownBindingMessageType(typ)),
        };
        let length = buf.get_u16() as usize;
        if buf.get_u32() != MAGIC_COOKIE {
            return Err(Error::ErrBadMagicCookie);
        }
        let mut transaction_id = [0u8; TRANSACTION_ID_SIZE];
        buf.copy_to_slice(&mut transaction_id);
        if buf.remaining() < length {
            return Err(Error::ErrBindingMessageTooShort(raw.len()));
        }

        let mut m = BindingMessage {
            class,
            transaction_id,
            username: None,
            priority: None,
            use_candidate: false,
            role: None,
            xor_mapped_address: None,
        };

        let mut attrs = &buf[..length];
        while attrs.has_remaining() {
            if attrs.remaining() < 4 {
                return Err(Error::ErrBindingMessageTooShort(raw.len()));
            }
            let attr_type = attrs.get_u16();
            let attr_len = attrs.get_u16() as usize;
            let padded = (attr_len + 3) & !3;
            if attrs.remaining() < padded {
                return Err(Error::ErrBindingMessageTooShort(raw.len()));
            }
            let value = &attrs[..attr_len];

            match attr_type {
                ATTR_USERNAME => {
                    m.username = Some(String::from_utf8_lossy(value).into_owned());
                }
                ATTR_PRIORITY if attr_len == 4 => {
                    m.priority = Some((&value[..]).get_u32());
                }
                ATTR_USE_CANDIDATE => m.use_candidate = true,
                ATTR_ICE_CONTROLLING if attr_len == 8 => {
                    m.role = Some(IceRoleAttr::Controlling((&value[..]).get_u64()));
                }
                ATTR_ICE_CONTROLLED if attr_len == 8 => {
                    m.role = Some(IceRoleAttr::Controlled((&value[..]).get_u64()));
                }
                ATTR_XOR_MAPPED_ADDRESS => {
                    m.xor_mapped_address = Some(unxor_address(value, &transaction_id)?);
                }
                _ => {}
            }

            attrs.advance(padded);
        }

        Ok(m)
    }
}

fn put_attribute(out: &mut BytesMut, typ: u16, value: &[u8]) {
    out.put_u16(typ);
    out.put_u16(value.len() as u16);
    out.put_slice(value);
    let padding = (4 - value.len() % 4) % 4;
    out.put_bytes(0, padding);
}

fn xor_key(transaction_id: &TransactionId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    key[4..].copy_from_slice(transaction_id);
    key
}

fn xor_address(addr: SocketAddr, transaction_id: &TransactionId) -> Vec<u8> {
    let key = xor_key(transaction_id);
    let mut value = vec![0u8];
    let port = addr.port() ^ (MAGIC_COOKIE >> 16) as u16;
    match addr.ip() {
        IpAddr::V4(ip) => {
            value.push(FAMILY_IPV4);
            value.extend_from_slice(&port.to_be_bytes());
            value.extend(ip.octets().iter().zip(key.iter()).map(|(b, k)| b ^ k));
        }
        IpAddr::V6(ip) => {
            value.push(FAMILY_IPV6);
            value.extend_from_slice(&port.to_be_bytes());
            value.extend(ip.octets().iter().zip(key.iter()).map(|(b, k)| b ^ k));
        }
    }
    value
}

fn unxor_address(value: &[u8], transaction_id: &TransactionId) -> Result<SocketAddr> {
    if value.len() < 4 {
        return Err(Error::ErrBindingMessageTooShort(value.len()));
    }
    let key = xor_key(transaction_id);
    let family = value[1];
    let port = u16::from_be_bytes([value[2], value[3]]) ^ (MAGIC_COOKIE >> 16) as u16;
    let address = &value[4..];

    let ip = match family {
        FAMILY_IPV4 if address.len() == 4 => {
            let mut octets = [0u8; 4];
            for (i, octet) in octets.iter_mut().enumerate() {
                *octet = address[i] ^ key[i];
            }
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        FAMILY_IPV6 if address.len() == 16 => {
            let mut octets = [0u8; 16];
            for (i, octet) in octets.iter_mut().enumerate() {
                *octet = address[i] ^ key[i];
            }
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return Err(Error::ErrBindingMessageTooShort(value.len())),
    };

    Ok(SocketAddr::new(ip, port))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_binding_request_wire_format() {
        let mut m = BindingMessage::request(
            "remote:local".to_owned(),
            2130706431,
            IceRoleAttr::Controlling(7),
            true,
        );
        m.transaction_id = [1; TRANSACTION_ID_SIZE];

        let raw = m.marshal();
        assert_eq!(&raw[0..2], &[0x00, 0x01]);
        assert_eq!(&raw[4..8], &[0x21, 0x12, 0xA4, 0x42]);
        assert_eq!(&raw[8..20], &[1; TRANSACTION_ID_SIZE]);

        // username (4 + 12) + priority (4 + 4) + use-candidate (4) + controlling (4 + 8)
        assert_eq!(&raw[2..4], &[0x00, 40]);
        assert_eq!(raw.len(), MESSAGE_HEADER_SIZE + 40);

        assert_eq!(BindingMessage::unmarshal(&raw), Ok(m));
    }

    #[test]
    fn test_binding_success_xor_mapped_address() {
        let request = BindingMessage::request(
            "a:b".to_owned(),
            1,
            IceRoleAttr::Controlled(9),
            false,
        );

        let tests: Vec<SocketAddr> = vec![
            "203.0.113.1:50001".parse().expect("v4"),
            "[2001:db8::1]:3478".parse().expect("v6"),
        ];

        for mapped in tests {
            let response = BindingMessage::success(&request, mapped);
            let decoded = BindingMessage::unmarshal(&response.marshal()).expect("decode");
            assert_eq!(decoded.class, BindingClass::SuccessResponse);
            assert_eq!(decoded.transaction_id, request.transaction_id);
            assert_eq!(decoded.xor_mapped_address, Some(mapped));
        }
    }

    #[test]
    fn test_binding_unmarshal_errors() {
        let valid = BindingMessage::request(
            "a:b".to_owned(),
            1,
            IceRoleAttr::Controlling(1),
            false,
        )
        .marshal();

        let mut bad_type = valid.clone();
        bad_type[0] = 0x01;
        bad_type[1] = 0x11;

        let mut bad_cookie = valid.clone();
        bad_cookie[4] = 0;

        let tests = vec![
            (valid[..10].to_vec(), Error::ErrBindingMessageTooShort(10)),
            (bad_type.to_vec(), Error::ErrUnknownBindingMessageType(0x0111)),
            (bad_cookie.to_vec(), Error::ErrBadMagicCookie),
            (
                valid[..valid.len() - 4].to_vec(),
                Error::ErrBindingMessageTooShort(valid.len() - 4),
            ),
        ];

        for (raw, expected) in tests {
            assert_eq!(BindingMessage::unmarshal(&raw), Err(expected));
        }
    }

    #[test]
    fn test_transaction_ids_are_random() {
        assert_ne!(new_transaction_id(), new_transaction_id());
    }
}

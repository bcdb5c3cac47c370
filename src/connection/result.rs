//! Request outcomes delivered to completion callbacks.

use crate::protocol::Packet;

/// Outcome code of a request, without the response packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// A response with the matching sync id arrived.
    Ok,
    /// The request was dismissed by a connection-level failure or shutdown.
    Err,
    /// The request's own deadline elapsed first.
    Timeout,
}

/// Outcome of one request. Every accepted request gets exactly one.
#[derive(Debug)]
pub enum RequestResult {
    /// Response frame correlated by sync id.
    Ok(Packet),
    /// Dismissed by reconnect, shutdown or drop; the outcome is unknown.
    Error,
    /// The request's deadline elapsed while the connection stayed usable.
    Timeout,
}

impl RequestResult {
    /// Outcome code.
    pub fn code(&self) -> ResultCode {
        match self {
            Self::Ok(_) => ResultCode::Ok,
            Self::Error => ResultCode::Err,
            Self::Timeout => ResultCode::Timeout,
        }
    }

    /// True if a response arrived.
    #[inline]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Borrow the response packet, if any.
    pub fn packet(&self) -> Option<&Packet> {
        match self {
            Self::Ok(packet) => Some(packet),
            _ => None,
        }
    }

    /// Take the response packet, if any.
    pub fn into_packet(self) -> Option<Packet> {
        match self {
            Self::Ok(packet) => Some(packet),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Packer;

    #[test]
    fn test_codes() {
        let ok = RequestResult::Ok(Packer::with_sync(1, 1).finish());
        assert_eq!(ok.code(), ResultCode::Ok);
        assert!(ok.is_ok());
        assert_eq!(ok.packet().map(Packet::sync), Some(1));

        assert_eq!(RequestResult::Error.code(), ResultCode::Err);
        assert_eq!(RequestResult::Timeout.code(), ResultCode::Timeout);
        assert!(RequestResult::Timeout.into_packet().is_none());
    }
}

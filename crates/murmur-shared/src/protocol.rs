use serde::{Deserialize, Serialize};

use crate::types::ChannelIdentifier;

/// What a sender hands to the ledger for one message.
///
/// The content itself lives in the blob store; the log only carries the
/// encrypted blob address and the sender's signature over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    /// Identifier precomputed by the receiver for this message.
    pub channel_identifier: ChannelIdentifier,
    /// Blob address sealed with the message key.
    pub encrypted_message_link: Vec<u8>,
    /// Ed25519 signature over `encrypted_message_link`.
    pub encrypted_message_link_signature: Vec<u8>,
}

impl WireRecord {
    /// Serialize to binary (bincode); ledgers hash these bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_record_bytes() {
        let record = WireRecord {
            channel_identifier: ChannelIdentifier("ab".repeat(32)),
            encrypted_message_link: vec![1, 2, 3],
            encrypted_message_link_signature: vec![9; 64],
        };

        let bytes = record.to_bytes().unwrap();
        assert_eq!(bytes, record.clone().to_bytes().unwrap());

        let mut resigned = record;
        resigned.encrypted_message_link_signature[0] ^= 0x01;
        assert_ne!(resigned.to_bytes().unwrap(), bytes);
    }
}

//! Wire codec for off-chain bid blobs (spec.md §4.6 "Key decoding
//! specifics an implementer must reproduce").
//!
//! This is a small, bespoke binary format — not literally SCALE, though it
//! borrows SCALE's two-low-bits compact-integer mode tag. Hand-decoded here
//! rather than leaning on `parity-scale-codec`'s `Compact<T>`, because the
//! spec only licenses two of its four modes (00/01) and rejects the other
//! two outright, which `Compact<T>`'s own decoder does not do.

use std::fmt;

/// A tagged-union signature, as stored alongside each off-chain bid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub scheme: SignatureScheme,
    /// The signer's address (EVM) or public key (Sr25519/Ed25519).
    pub signer: Vec<u8>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    Evm,
    Sr25519,
    Ed25519,
}

impl SignatureScheme {
    fn from_tag(tag: u8) -> Result<Self, CodecError> {
        match tag {
            0 => Ok(SignatureScheme::Evm),
            1 => Ok(SignatureScheme::Sr25519),
            2 => Ok(SignatureScheme::Ed25519),
            other => Err(CodecError::UnknownSignatureTag(other)),
        }
    }
}

/// `{filler: [u8;32], user_op: bytes}` (spec.md §3 `FillerBid`, minus the
/// on-chain `deposit` field, which is read separately from storage).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bid {
    pub filler: [u8; 32],
    /// ABI-encoded user operation. Opaque to the filler — never
    /// interpreted, only passed through to submission/retraction.
    pub user_op: Vec<u8>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("input exhausted while decoding {0}")]
    Truncated(&'static str),
    #[error("compact length mode {0:02b} is not permitted for address/signature length fields")]
    UnsupportedLengthMode(u8),
    #[error("unknown signature variant tag {0}")]
    UnknownSignatureTag(u8),
}

impl fmt::Display for Bid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bid {{ filler: 0x{}, user_op: {} bytes }}", hex::encode(self.filler), self.user_op.len())
    }
}

/// A cursor over a byte slice, tracking how much has been consumed.
struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], CodecError> {
        if self.input.len() < self.pos + n {
            return Err(CodecError::Truncated(field));
        }
        let slice = &self.input[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_u8(&mut self, field: &'static str) -> Result<u8, CodecError> {
        Ok(self.take(1, field)?[0])
    }

    /// Decode a compact length per spec.md §4.6: the low two bits of the
    /// first byte select the mode. `00` → single byte, value = `b >> 2`.
    /// `01` → two bytes, value = `(b2 << 6) | (b1 >> 2)`. `10`/`11` are
    /// rejected outright for address/signature length fields.
    fn take_compact_length(&mut self, field: &'static str) -> Result<usize, CodecError> {
        let b1 = self.take_u8(field)?;
        match b1 & 0b11 {
            0b00 => Ok((b1 >> 2) as usize),
            0b01 => {
                let b2 = self.take_u8(field)?;
                Ok((((b2 as u16) << 6) | ((b1 as u16) >> 2)) as usize)
            }
            mode => Err(CodecError::UnsupportedLengthMode(mode)),
        }
    }

    fn take_length_prefixed(&mut self, field: &'static str) -> Result<Vec<u8>, CodecError> {
        let len = self.take_compact_length(field)?;
        Ok(self.take(len, field)?.to_vec())
    }
}

/// Decode a tagged-union [`Signature`] from the front of `input`, returning
/// it alongside the number of bytes consumed.
pub fn decode_signature(input: &[u8]) -> Result<(Signature, usize), CodecError> {
    let mut cursor = Cursor::new(input);
    let tag = cursor.take_u8("signature tag")?;
    let scheme = SignatureScheme::from_tag(tag)?;
    let signer = cursor.take_length_prefixed("signature signer")?;
    let bytes = cursor.take_length_prefixed("signature bytes")?;
    Ok((Signature { scheme, signer, bytes }, cursor.pos))
}

/// Decode a [`Bid`] from the front of `input`: a fixed 32-byte `filler`
/// followed by a length-prefixed `user_op`.
pub fn decode_bid(input: &[u8]) -> Result<(Bid, usize), CodecError> {
    let mut cursor = Cursor::new(input);
    let filler: [u8; 32] = cursor.take(32, "bid filler")?.try_into().expect("length checked above");
    let user_op = cursor.take_length_prefixed("bid user_op")?;
    Ok((Bid { filler, user_op }, cursor.pos))
}

/// Decode a full off-chain bid blob: a [`Signature`] immediately followed by
/// a [`Bid`] (spec.md §4.6 step 3).
pub fn decode_off_chain_blob(input: &[u8]) -> Result<(Signature, Bid), CodecError> {
    let (signature, consumed) = decode_signature(input)?;
    let (bid, _) = decode_bid(&input[consumed..])?;
    Ok((signature, bid))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_compact_length(value: u16) -> Vec<u8> {
        if value < (1 << 6) {
            vec![((value as u8) << 2) | 0b00]
        } else {
            assert!(value < (1 << 14), "value too large for the two-byte mode used in tests");
            let low6 = value & 0x3F;
            let high = value >> 6;
            let b1 = ((low6 << 2) as u8) | 0b01;
            let b2 = high as u8;
            vec![b1, b2]
        }
    }

    #[test]
    fn single_byte_compact_length_round_trips() {
        let mut cursor = Cursor::new(&encode_compact_length(5));
        assert_eq!(cursor.take_compact_length("test").unwrap(), 5);
    }

    #[test]
    fn two_byte_compact_length_round_trips() {
        let mut cursor = Cursor::new(&encode_compact_length(300));
        assert_eq!(cursor.take_compact_length("test").unwrap(), 300);
    }

    #[test]
    fn mode_10_and_11_are_rejected() {
        assert_eq!(
            Cursor::new(&[0b10]).take_compact_length("test").unwrap_err(),
            CodecError::UnsupportedLengthMode(0b10)
        );
        assert_eq!(
            Cursor::new(&[0b11]).take_compact_length("test").unwrap_err(),
            CodecError::UnsupportedLengthMode(0b11)
        );
    }

    #[test]
    fn decode_signature_round_trips_each_scheme() {
        for (tag, scheme) in [(0u8, SignatureScheme::Evm), (1, SignatureScheme::Sr25519), (2, SignatureScheme::Ed25519)]
        {
            let mut blob = vec![tag];
            blob.extend(encode_compact_length(20));
            blob.extend(vec![0xAB; 20]);
            blob.extend(encode_compact_length(65));
            blob.extend(vec![0xCD; 65]);

            let (sig, consumed) = decode_signature(&blob).unwrap();
            assert_eq!(sig.scheme, scheme);
            assert_eq!(sig.signer, vec![0xAB; 20]);
            assert_eq!(sig.bytes, vec![0xCD; 65]);
            assert_eq!(consumed, blob.len());
        }
    }

    #[test]
    fn decode_signature_rejects_unknown_tag() {
        let err = decode_signature(&[9, 0, 0]).unwrap_err();
        assert_eq!(err, CodecError::UnknownSignatureTag(9));
    }

    #[test]
    fn decode_bid_reads_fixed_filler_and_length_prefixed_user_op() {
        let mut blob = vec![0x11; 32];
        blob.extend(encode_compact_length(4));
        blob.extend([1, 2, 3, 4]);

        let (bid, consumed) = decode_bid(&blob).unwrap();
        assert_eq!(bid.filler, [0x11; 32]);
        assert_eq!(bid.user_op, vec![1, 2, 3, 4]);
        assert_eq!(consumed, blob.len());
    }

    #[test]
    fn decode_off_chain_blob_decodes_signature_then_bid() {
        let mut blob = vec![0u8]; // EVM tag
        blob.extend(encode_compact_length(20));
        blob.extend(vec![0xAA; 20]);
        blob.extend(encode_compact_length(65));
        blob.extend(vec![0xBB; 65]);
        blob.extend(vec![0x22; 32]); // filler
        blob.extend(encode_compact_length(2));
        blob.extend([9, 9]);

        let (signature, bid) = decode_off_chain_blob(&blob).unwrap();
        assert_eq!(signature.scheme, SignatureScheme::Evm);
        assert_eq!(bid.filler, [0x22; 32]);
        assert_eq!(bid.user_op, vec![9, 9]);
    }

    #[test]
    fn truncated_input_is_an_error() {
        assert!(decode_signature(&[0, 0b00]).is_err());
    }
}

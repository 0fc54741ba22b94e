//! Helpers for decoding ledger snapshots.

use core::convert::{TryFrom, TryInto};
use bitcoin::Amount;

pub(crate) trait Int {
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]>;

    fn from_be_bytes(bytes: Self::Bytes) -> Self;
}

macro_rules! impl_int {
    ($($type:ty),*) => {
        $(
            impl Int for $type {
                type Bytes = [u8; core::mem::size_of::<$type>()];

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$type>::from_be_bytes(bytes)
                }
            }
        )*
    }
}

impl_int!(u8, u32, u64);

pub(crate) fn be<T: Int>(bytes: &mut &[u8]) -> Result<T, UnexpectedEnd> {
    if bytes.len() < core::mem::size_of::<T::Bytes>() {
        return Err(UnexpectedEnd);
    }
    let byte_arr: T::Bytes = bytes[..core::mem::size_of::<T::Bytes>()].try_into().map_err(|_| UnexpectedEnd)?;
    *bytes = &bytes[core::mem::size_of::<T::Bytes>()..];
    Ok(T::from_be_bytes(byte_arr))
}

pub(crate) fn amount(bytes: &mut &[u8]) -> Result<Amount, UnexpectedEnd> {
    be::<u64>(bytes).map(Amount::from_sat)
}

pub(crate) fn x_only_key(bytes: &mut &[u8]) -> Result<secp256k1::XOnlyPublicKey, KeyDeserError> {
    if bytes.len() < 32 {
        return Err(KeyDeserError::UnexpectedEnd);
    }
    let result = secp256k1::XOnlyPublicKey::from_slice(&bytes[..32]);
    *bytes = &bytes[32..];
    result.map_err(KeyDeserError::Invalid)
}

pub(crate) fn serialize_amount(amount: Amount, out: &mut Vec<u8>) {
    out.extend_from_slice(&amount.to_sat().to_be_bytes());
}

#[derive(Debug)]
pub(crate) struct UnexpectedEnd;

#[derive(Debug)]
pub(crate) enum KeyDeserError {
    UnexpectedEnd,
    Invalid(secp256k1::Error),
}

/// Just to avoid duplicating version values (SSOT).
macro_rules! version_enum {
    (pub enum $name:ident { $($variant:ident = $value:expr),* $(,)? }) => {
        #[must_use = "Protect the code against forgetting to handle new variants"]
        #[derive(Copy, Clone, Eq, PartialEq, Debug)]
        pub enum $name {
            $($variant = $value,)*
        }

        impl $name {
            pub const fn from_num(num: u32) -> Option<Self> {
                match num {
                    $(
                        $value => Some(Self::$variant),
                    )*
                    _ => None,
                }
            }
        }
    }
}

version_enum! {
    pub enum StateVersion {
        V1 = 0x01,
    }
}

impl StateVersion {
    pub const CURRENT: Self = Self::V1;

    /// Deserializes state version.
    ///
    /// Snapshots start with the byte 255 followed by a 4-byte big endian version number. The
    /// marker byte makes it possible to tell a snapshot apart from other files a host may keep
    /// next to it (key files start with arbitrary secret bytes, so they are only rejected with
    /// high probability).
    pub fn deserialize(bytes: &mut &[u8]) -> Result<Self, StateVersionDeserError> {
        match bytes.first() {
            Some(255) => (),
            Some(byte) => return Err(StateVersionDeserError::MissingMarker(*byte)),
            None => return Err(StateVersionDeserError::UnexpectedEnd),
        }
        *bytes = &bytes[1..];
        let num = be::<u32>(bytes)?;
        Self::from_num(num).ok_or(StateVersionDeserError::UnsupportedVersion(num))
    }

    /// Serializes the state version including the initial 255 byte.
    pub fn serialize(self, out: &mut Vec<u8>) {
        out.reserve(1 + 4);
        out.push(255);
        out.extend_from_slice(&(self as u32).to_be_bytes());
    }
}

/// Error returned when deserializing version number fails.
#[derive(Debug)]
pub enum StateVersionDeserError {
    /// The input data is too short.
    UnexpectedEnd,
    /// The input doesn't start with the snapshot marker.
    MissingMarker(u8),
    /// The version number is not supported (currently always higher).
    UnsupportedVersion(u32),
}

impl From<UnexpectedEnd> for StateVersionDeserError {
    fn from(_: UnexpectedEnd) -> Self {
        Self::UnexpectedEnd
    }
}

#[cfg(test)]
mod tests {
    use super::{StateVersion, StateVersionDeserError};

    #[test]
    fn version_header() {
        let mut bytes = Vec::new();
        StateVersion::CURRENT.serialize(&mut bytes);
        assert_eq!(bytes, [255, 0, 0, 0, 1]);
        let mut cursor = &*bytes;
        assert_eq!(StateVersion::deserialize(&mut cursor).unwrap(), StateVersion::V1);
        assert!(cursor.is_empty());
    }

    #[test]
    fn bad_headers() {
        match StateVersion::deserialize(&mut &[255, 0, 0, 0, 2][..]) {
            Err(StateVersionDeserError::UnsupportedVersion(2)) => (),
            other => panic!("unexpected result: {:?}", other),
        }
        match StateVersion::deserialize(&mut &[7, 0, 0, 0, 1][..]) {
            Err(StateVersionDeserError::MissingMarker(7)) => (),
            other => panic!("unexpected result: {:?}", other),
        }
        match StateVersion::deserialize(&mut &[255, 0, 0][..]) {
            Err(StateVersionDeserError::UnexpectedEnd) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}

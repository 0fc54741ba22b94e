macro_rules! impl_arbitrary {
    ($type:ident$(<$($gen:ident),*>)?, $($field:ident),*) => {
        #[cfg(test)]
        impl$(<$($gen: 'static),*>)?  quickcheck::Arbitrary for $type$(<$($gen),*>)? {
            fn arbitrary(gen: &mut quickcheck::Gen) -> Self {
                let _ = &gen;
                $type {
                    $(
                        $field: crate::test_macros::qc_help::Hack::new(0).arbitrary(gen),
                    )*
                }
            }
        }
    };
}
pub(crate) use impl_arbitrary;

#[cfg(test)]
macro_rules! check_roundtrip {
    ($name:ident, $ty:ty) => {
        mod $name {
            #[allow(unused)]
            use super::*;
            quickcheck::quickcheck! {
                fn roundtrip(val: $ty) -> bool {
                    let mut bytes = Vec::new();
                    val.serialize(&mut bytes);
                    let mut cursor = &*bytes;
                    let val2 = <$ty>::deserialize(&mut cursor).unwrap();

                    assert_eq!(val2, val);
                    cursor.is_empty()
                }
            }

            quickcheck::quickcheck! {
                fn garbage(val: $ty, modify: Vec<(usize, u8)>, insert: Vec<(usize, u8)>, delete: Vec<usize>) -> bool {
                    let mut bytes = Vec::new();
                    val.serialize(&mut bytes);
                    crate::test_macros::mangle(&mut bytes, modify, insert, delete);

                    let _ = <$ty>::deserialize(&mut &*bytes);

                    true
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) use check_roundtrip;

/// Randomly damages serialized data to check that decoders don't panic.
#[cfg(test)]
pub(crate) fn mangle(bytes: &mut Vec<u8>, modify: Vec<(usize, u8)>, insert: Vec<(usize, u8)>, delete: Vec<usize>) {
    if !bytes.is_empty() {
        for (pos, byte) in modify {
            let pos = pos % bytes.len();
            bytes[pos] = byte;
        }
    }

    for (pos, byte) in insert {
        let pos = pos % (bytes.len() + 1);
        bytes.insert(pos, byte);
    }

    for pos in delete {
        if bytes.is_empty() {
            break
        }
        let pos = pos % bytes.len();
        bytes.remove(pos);
    }
}


/// Abbreviation for out arbitrary trait.
#[cfg(test)]
pub(crate) fn arbitrary<T: qc_help::Arbitrary>(gen: &mut quickcheck::Gen) -> T {
    T::arbitrary(gen)
}

//! Serialization utilities for the `cannonball-memory` crate.

/// Generates a hex string serialization module for a fixed-size byte array.
macro_rules! fixed_hex_ser {
    ($module_name:ident, $size:expr) => {
        #[doc = concat!("Serialization utilities for a fixed-size byte array of size ", stringify!($size), ".")]
        pub mod $module_name {
            use alloy_primitives::hex;
            use serde::{self, Deserialize, Deserializer, Serializer};

            #[doc = "Serialize a fixed-size byte array to a hex string."]
            pub fn serialize<S>(bytes: &[u8; $size], serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
            }

            #[doc = "Deserialize a fixed-size byte array from a hex string."]
            pub fn deserialize<'de, D>(deserializer: D) -> Result<Box<[u8; $size]>, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
                if bytes.len() != $size {
                    return Err(serde::de::Error::invalid_length(
                        bytes.len(),
                        &concat!("a hex string of ", stringify!($size), " bytes"),
                    ));
                }
                let mut array = Box::new([0u8; $size]);
                array.copy_from_slice(&bytes);
                Ok(array)
            }
        }
    };
}

fixed_hex_ser!(page_hex, crate::types::PAGE_SIZE);

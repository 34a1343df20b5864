//! Leaf value types commonly embedded in components.
//!
//! Vectors, quaternions, rects and float colors encode as flat arrays;
//! byte colors and asset references encode as small mappings; layer masks
//! encode as a bare integer.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

macro_rules! array_codec {
    ($name:ident, $scalar:ty, [$($field:ident),+]) => {
        #[derive(Debug, Clone, Copy, Default, PartialEq)]
        pub struct $name {
            $(pub $field: $scalar,)+
        }

        impl $name {
            pub const fn new($($field: $scalar),+) -> Self {
                Self { $($field),+ }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                [$(self.$field),+].serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let values = Vec::<$scalar>::deserialize(deserializer)?;
                let expected = [$(stringify!($field)),+].len();
                if values.len() != expected {
                    return Err(serde::de::Error::invalid_length(
                        values.len(),
                        &concat!("an array of ", stringify!($name), " components"),
                    ));
                }
                let mut iter = values.into_iter();
                Ok(Self {
                    $($field: iter.next().unwrap_or_default(),)+
                })
            }
        }
    };
}

array_codec!(Vec2, f32, [x, y]);
array_codec!(Vec3, f32, [x, y, z]);
array_codec!(Vec2i, i32, [x, y]);
array_codec!(Vec3i, i32, [x, y, z]);
array_codec!(Quat, f32, [x, y, z, w]);
array_codec!(Rect, f32, [x, y, width, height]);
array_codec!(Color, f32, [r, g, b, a]);

impl Quat {
    pub const IDENTITY: Quat = Quat::new(0.0, 0.0, 0.0, 1.0);
}

/// 8-bit RGBA color.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color32 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerMask(pub i32);

/// Reference to an externally stored asset, addressed by guid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    pub guid: String,
}

impl AssetRef {
    pub fn new(guid: impl Into<String>) -> Self {
        Self { guid: guid.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn vectors_encode_as_arrays() {
        let encoded = serde_json::to_value(Vec3::new(1.0, 2.5, -3.0)).unwrap();
        assert_eq!(encoded, json!([1.0, 2.5, -3.0]));
        let decoded: Vec2i = serde_json::from_value(json!([4, -2])).unwrap();
        assert_eq!(decoded, Vec2i::new(4, -2));
    }

    #[test]
    fn wrong_arity_is_rejected() {
        assert!(serde_json::from_value::<Quat>(json!([0.0, 0.0, 1.0])).is_err());
        assert!(serde_json::from_value::<Vec2>(json!([0.0, 0.0, 1.0])).is_err());
    }

    #[test]
    fn mapping_and_scalar_codecs() {
        let color = Color32 { r: 255, g: 128, b: 0, a: 255 };
        assert_eq!(
            serde_json::to_value(color).unwrap(),
            json!({"r": 255, "g": 128, "b": 0, "a": 255})
        );
        assert_eq!(serde_json::to_value(LayerMask(9)).unwrap(), json!(9));
        assert_eq!(
            serde_json::to_value(AssetRef::new("abc")).unwrap(),
            json!({"guid": "abc"})
        );
    }
}

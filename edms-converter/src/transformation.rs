//! Typed page transformations.
//!
//! A transformation is parsed once from its name and string arguments, so
//! argument errors surface before any tool runs. Lists are applied in order.

use edms_core::ConverterError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// One operation on a rendered page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum Transformation {
    /// Fit into `width` pixels wide, and `height` high when given.
    Resize { width: u32, height: Option<u32> },
    /// Clockwise rotation, normalised to `0..360`.
    Rotate { degrees: u32 },
    Zoom { percent: u32 },
    Density { dpi: u32 },
    /// Pixels trimmed from each edge.
    Crop {
        left: u32,
        top: u32,
        right: u32,
        bottom: u32,
    },
}

impl Transformation {
    pub const NAMES: [&'static str; 5] = ["resize", "rotate", "zoom", "density", "crop"];

    pub fn name(&self) -> &'static str {
        match self {
            Transformation::Resize { .. } => "resize",
            Transformation::Rotate { .. } => "rotate",
            Transformation::Zoom { .. } => "zoom",
            Transformation::Density { .. } => "density",
            Transformation::Crop { .. } => "crop",
        }
    }

    pub fn rotate(degrees: i64) -> Self {
        Transformation::Rotate {
            degrees: degrees.rem_euclid(360) as u32,
        }
    }

    /// Build from a name and `(argument, value)` pairs.
    pub fn from_arguments<K, V>(name: &str, arguments: &[(K, V)]) -> Result<Self, ConverterError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let args = Arguments {
            transformation: name,
            pairs: arguments
                .iter()
                .map(|(k, v)| (k.as_ref(), v.as_ref()))
                .collect(),
        };

        let transformation = match name {
            "resize" => {
                args.only(&["width", "height"])?;
                Transformation::Resize {
                    width: args.positive("width")?,
                    height: match args.find("height") {
                        Some(_) => Some(args.positive("height")?),
                        None => None,
                    },
                }
            }
            "rotate" => {
                args.only(&["degrees"])?;
                Transformation::rotate(args.integer("degrees")?)
            }
            "zoom" => {
                args.only(&["percent"])?;
                Transformation::Zoom {
                    percent: args.positive("percent")?,
                }
            }
            "density" => {
                args.only(&["dpi"])?;
                Transformation::Density {
                    dpi: args.positive("dpi")?,
                }
            }
            "crop" => {
                args.only(&["left", "top", "right", "bottom"])?;
                Transformation::Crop {
                    left: args.unsigned("left")?,
                    top: args.unsigned("top")?,
                    right: args.unsigned("right")?,
                    bottom: args.unsigned("bottom")?,
                }
            }
            _ => {
                return Err(ConverterError::UnknownTransformation {
                    name: name.to_string(),
                })
            }
        };
        Ok(transformation)
    }

    /// Canonical arguments, sorted by name.
    pub fn arguments(&self) -> Vec<(&'static str, String)> {
        let mut arguments = match *self {
            Transformation::Resize { width, height } => {
                let mut a = vec![("width", width.to_string())];
                if let Some(height) = height {
                    a.push(("height", height.to_string()));
                }
                a
            }
            Transformation::Rotate { degrees } => vec![("degrees", degrees.to_string())],
            Transformation::Zoom { percent } => vec![("percent", percent.to_string())],
            Transformation::Density { dpi } => vec![("dpi", dpi.to_string())],
            Transformation::Crop {
                left,
                top,
                right,
                bottom,
            } => vec![
                ("left", left.to_string()),
                ("top", top.to_string()),
                ("right", right.to_string()),
                ("bottom", bottom.to_string()),
            ],
        };
        arguments.sort_by_key(|(key, _)| *key);
        arguments
    }

    /// SHA-256 over the name, then each sorted key and value, hex encoded.
    pub fn cache_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name().as_bytes());
        for (key, value) in self.arguments() {
            hasher.update(key.as_bytes());
            hasher.update(value.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// SHA-256 over the concatenated hashes of `transformations`, in order.
    pub fn combine(transformations: &[Transformation]) -> String {
        let mut hasher = Sha256::new();
        for transformation in transformations {
            hasher.update(transformation.cache_hash().as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name())?;
        for (i, (key, value)) in self.arguments().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        write!(f, ")")
    }
}

struct Arguments<'a> {
    transformation: &'a str,
    pairs: Vec<(&'a str, &'a str)>,
}

impl<'a> Arguments<'a> {
    fn only(&self, allowed: &[&str]) -> Result<(), ConverterError> {
        match self.pairs.iter().find(|(key, _)| !allowed.contains(key)) {
            Some((key, _)) => Err(self.invalid(key, "unknown argument")),
            None => Ok(()),
        }
    }

    fn find(&self, argument: &str) -> Option<&'a str> {
        self.pairs
            .iter()
            .find(|(key, _)| *key == argument)
            .map(|(_, value)| value.trim())
    }

    fn require(&self, argument: &str) -> Result<&'a str, ConverterError> {
        self.find(argument)
            .ok_or_else(|| ConverterError::MissingTransformationArgument {
                transformation: self.transformation.to_string(),
                argument: argument.to_string(),
            })
    }

    fn integer(&self, argument: &str) -> Result<i64, ConverterError> {
        let value = self.require(argument)?;
        value
            .parse::<i64>()
            .map_err(|_| self.invalid(argument, &format!("'{}' is not an integer", value)))
    }

    fn unsigned(&self, argument: &str) -> Result<u32, ConverterError> {
        let value = self.require(argument)?;
        value
            .parse::<u32>()
            .map_err(|_| self.invalid(argument, &format!("'{}' is not a non-negative integer", value)))
    }

    fn positive(&self, argument: &str) -> Result<u32, ConverterError> {
        match self.unsigned(argument)? {
            0 => Err(self.invalid(argument, "must be greater than zero")),
            value => Ok(value),
        }
    }

    fn invalid(&self, argument: &str, reason: &str) -> ConverterError {
        ConverterError::InvalidTransformationArgument {
            transformation: self.transformation.to_string(),
            argument: argument.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(name: &str, args: &[(&str, &str)]) -> Result<Transformation, ConverterError> {
        Transformation::from_arguments(name, args)
    }

    #[test]
    fn test_parse_each_kind() {
        assert_eq!(
            parse("resize", &[("width", "640")]).unwrap(),
            Transformation::Resize {
                width: 640,
                height: None
            }
        );
        assert_eq!(
            parse("resize", &[("height", "480"), ("width", "640")]).unwrap(),
            Transformation::Resize {
                width: 640,
                height: Some(480)
            }
        );
        assert_eq!(
            parse("zoom", &[("percent", "150")]).unwrap(),
            Transformation::Zoom { percent: 150 }
        );
        assert_eq!(
            parse("density", &[("dpi", "300")]).unwrap(),
            Transformation::Density { dpi: 300 }
        );
        assert_eq!(
            parse(
                "crop",
                &[("left", "1"), ("top", "2"), ("right", "3"), ("bottom", "0")]
            )
            .unwrap(),
            Transformation::Crop {
                left: 1,
                top: 2,
                right: 3,
                bottom: 0
            }
        );
    }

    #[test]
    fn test_rotate_is_normalised() {
        assert_eq!(
            parse("rotate", &[("degrees", "450")]).unwrap(),
            Transformation::Rotate { degrees: 90 }
        );
        assert_eq!(
            parse("rotate", &[("degrees", "-90")]).unwrap(),
            Transformation::Rotate { degrees: 270 }
        );
        assert_eq!(Transformation::rotate(360), Transformation::Rotate { degrees: 0 });
    }

    #[test]
    fn test_unknown_transformation() {
        assert_eq!(
            parse("flip", &[]),
            Err(ConverterError::UnknownTransformation {
                name: "flip".to_string()
            })
        );
    }

    #[test]
    fn test_missing_argument() {
        assert_eq!(
            parse("zoom", &[]),
            Err(ConverterError::MissingTransformationArgument {
                transformation: "zoom".to_string(),
                argument: "percent".to_string()
            })
        );
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(matches!(
            parse("resize", &[("width", "wide")]),
            Err(ConverterError::InvalidTransformationArgument { .. })
        ));
        assert!(matches!(
            parse("resize", &[("width", "0")]),
            Err(ConverterError::InvalidTransformationArgument { .. })
        ));
        assert!(matches!(
            parse("density", &[("dpi", "300"), ("colour", "red")]),
            Err(ConverterError::InvalidTransformationArgument { .. })
        ));
        assert!(matches!(
            parse("crop", &[("left", "-1"), ("top", "0"), ("right", "0"), ("bottom", "0")]),
            Err(ConverterError::InvalidTransformationArgument { .. })
        ));
    }

    #[test]
    fn test_cache_hash_matches_name_then_sorted_pairs() {
        let transformation = parse("resize", &[("width", "640"), ("height", "480")]).unwrap();
        let mut hasher = Sha256::new();
        for part in ["resize", "height", "480", "width", "640"] {
            hasher.update(part.as_bytes());
        }
        assert_eq!(transformation.cache_hash(), hex::encode(hasher.finalize()));
    }

    #[test]
    fn test_combine_is_order_sensitive() {
        let rotate = Transformation::rotate(90);
        let zoom = Transformation::Zoom { percent: 50 };
        assert_ne!(
            Transformation::combine(&[rotate, zoom]),
            Transformation::combine(&[zoom, rotate])
        );
        assert_eq!(Transformation::combine(&[]).len(), 64);
    }

    #[test]
    fn test_display() {
        let transformation = parse("resize", &[("width", "640"), ("height", "480")]).unwrap();
        assert_eq!(transformation.to_string(), "resize(height=480, width=640)");
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_rotate_always_in_range(degrees in any::<i32>()) {
            let degrees = degrees.to_string();
            let transformation = Transformation::from_arguments("rotate", &[("degrees", degrees.as_str())]).unwrap();
            match transformation {
                Transformation::Rotate { degrees } => prop_assert!(degrees < 360),
                other => prop_assert!(false, "unexpected {:?}", other),
            }
        }

        #[test]
        fn prop_arguments_reparse(width in 1u32..10_000, height in proptest::option::of(1u32..10_000)) {
            let original = Transformation::Resize { width, height };
            let reparsed = Transformation::from_arguments(original.name(), &original.arguments()).unwrap();
            prop_assert_eq!(reparsed.cache_hash(), original.cache_hash());
        }
    }
}

//! Property-Based Tests for Transformations
//!
//! A transformation parsed from its own canonical arguments is the same
//! transformation, the cache hash of a list depends on its order, and the
//! magick command line keeps its input first and its output last.

use edms_converter::{convert_arguments, ConversionRequest, Transformation};
use edms_test_utils::generators::{arb_quality_preset, arb_transformation, arb_transformations};
use proptest::prelude::*;
use std::path::Path;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Canonical arguments parse back to the same transformation.
    #[test]
    fn prop_canonical_arguments_reparse(transformation in arb_transformation()) {
        let parsed = Transformation::from_arguments(
            transformation.name(),
            &transformation.arguments(),
        )
        .unwrap();
        prop_assert_eq!(parsed, transformation);
    }

    /// Rotation is normalised into a single turn.
    #[test]
    fn prop_rotation_normalised(degrees in -10_000i64..10_000) {
        match Transformation::rotate(degrees) {
            Transformation::Rotate { degrees: normalised } => {
                prop_assert!(normalised < 360);
                prop_assert_eq!((degrees - normalised as i64).rem_euclid(360), 0);
            }
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }

    /// Equal lists hash equally; reordering distinct steps changes the hash.
    #[test]
    fn prop_combined_hash_is_ordered(transformations in arb_transformations()) {
        prop_assert_eq!(
            Transformation::combine(&transformations),
            Transformation::combine(&transformations.clone())
        );
        let mut reversed = transformations.clone();
        reversed.reverse();
        if reversed != transformations {
            prop_assert_ne!(
                Transformation::combine(&transformations),
                Transformation::combine(&reversed)
            );
        }
    }

    /// Density leads only when the preset sets one; the output is last.
    #[test]
    fn prop_convert_arguments_shape(
        quality in arb_quality_preset(),
        transformations in arb_transformations(),
        page in 1u32..50,
    ) {
        let request = ConversionRequest::new("/docs/scan.tiff", "png")
            .with_page(page)
            .with_quality(quality)
            .with_transformations(transformations);
        let args = convert_arguments(&request, Path::new("/tmp/out"), 85);

        let input_at = match quality.density() {
            Some(dpi) => {
                prop_assert_eq!(&args[0], "-density");
                prop_assert_eq!(&args[1], &dpi.to_string());
                2
            }
            None => 0,
        };
        prop_assert_eq!(&args[input_at], &format!("/docs/scan.tiff[{}]", page - 1));
        prop_assert_eq!(args.last().unwrap(), "png:/tmp/out");
        prop_assert!(!args.contains(&"-quality".to_string()));
    }
}

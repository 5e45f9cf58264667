//! Algebraic laws of the bitmask type

use hierarch_core::{Bitmask, BitmaskSize};
use proptest::prelude::*;

fn bit_string(len: usize) -> impl Strategy<Value = String> {
    proptest::collection::vec(prop_oneof![Just('0'), Just('1')], len)
        .prop_map(|bits| bits.into_iter().collect())
}

fn mask_pair() -> impl Strategy<Value = (Bitmask, Bitmask)> {
    (1usize..200).prop_flat_map(|len| (bit_string(len), bit_string(len))).prop_map(|(a, b)| {
        (a.parse().unwrap(), b.parse().unwrap())
    })
}

proptest! {
    #[test]
    fn test_text_form_preserved(text in (1usize..300).prop_flat_map(bit_string)) {
        let mask: Bitmask = text.parse().unwrap();
        prop_assert_eq!(mask.to_string(), text.clone());
        for (i, ch) in text.chars().enumerate() {
            prop_assert_eq!(mask.test(i), ch == '1');
        }
    }

    #[test]
    fn test_and_narrows_or_widens((a, b) in mask_pair()) {
        let both = a.and(&b);
        let either = a.or(&b);
        prop_assert!(both.is_subset_of(&a));
        prop_assert!(both.is_subset_of(&b));
        prop_assert!(a.is_subset_of(&either));
        prop_assert!(b.is_subset_of(&either));
    }

    #[test]
    fn test_de_morgan((a, b) in mask_pair()) {
        prop_assert_eq!(a.and(&b).not(), a.not().or(&b.not()));
        prop_assert_eq!(a.or(&b).not(), a.not().and(&b.not()));
    }

    #[test]
    fn test_all_ones_is_and_identity((a, _b) in mask_pair()) {
        let ones = Bitmask::all_ones(a.size());
        let zeros = Bitmask::all_zeros(a.size());
        prop_assert_eq!(a.and(&ones), a.clone());
        prop_assert_eq!(a.or(&zeros), a.clone());
        prop_assert_eq!(a.not().not(), a);
    }
}

#[test]
fn test_or_reduce_of_nothing_is_zero() {
    let size = BitmaskSize::new(1024).unwrap();
    let none: [Bitmask; 0] = [];
    assert!(Bitmask::or_reduce(none, size).is_zero());
}

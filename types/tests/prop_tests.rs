use proptest::prelude::*;

use chratos_types::{Account, Amount, BlockHash, Timestamp};

proptest! {
    /// BlockHash roundtrip: new -> as_bytes produces identical bytes.
    #[test]
    fn block_hash_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let hash = BlockHash::new(bytes);
        prop_assert_eq!(hash.as_bytes(), &bytes);
    }

    /// BlockHash::is_zero is true only for all-zero bytes.
    #[test]
    fn block_hash_is_zero_correct(bytes in prop::array::uniform32(0u8..)) {
        let hash = BlockHash::new(bytes);
        prop_assert_eq!(hash.is_zero(), bytes == [0u8; 32]);
    }

    /// BlockHash bincode serialization roundtrip.
    #[test]
    fn block_hash_bincode_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let hash = BlockHash::new(bytes);
        let encoded = bincode::serialize(&hash).unwrap();
        let decoded: BlockHash = bincode::deserialize(&encoded).unwrap();
        prop_assert_eq!(decoded, hash);
    }

    /// Account/root conversion preserves bytes.
    #[test]
    fn account_root_conversion(bytes in prop::array::uniform32(0u8..)) {
        let account = Account::new(bytes);
        let root = account.into_root();
        prop_assert_eq!(root.as_bytes(), &bytes);
    }

    /// Amount saturating_sub never underflows.
    #[test]
    fn amount_saturating_sub(a in any::<u128>(), b in any::<u128>()) {
        let result = Amount::new(a).saturating_sub(Amount::new(b));
        prop_assert_eq!(result.raw(), a.saturating_sub(b));
    }

    /// Timestamp ordering matches raw ordering.
    #[test]
    fn timestamp_ordering(a in any::<u64>(), b in any::<u64>()) {
        let ta = Timestamp::from_millis(a);
        let tb = Timestamp::from_millis(b);
        prop_assert_eq!(ta <= tb, a <= b);
        prop_assert_eq!(ta == tb, a == b);
    }

    /// elapsed_since is the saturating difference.
    #[test]
    fn timestamp_elapsed_since(base in 0u64..1_000_000, offset in 0u64..1_000_000) {
        let t = Timestamp::from_millis(base);
        let now = Timestamp::from_millis(base + offset);
        prop_assert_eq!(t.elapsed_since(now), offset);
    }

    /// has_expired agrees with manual arithmetic.
    #[test]
    fn timestamp_has_expired(
        base in 0u64..1_000_000,
        duration in 0u64..1_000_000,
        now in 0u64..3_000_000,
    ) {
        let t = Timestamp::from_millis(base);
        prop_assert_eq!(
            t.has_expired(duration, Timestamp::from_millis(now)),
            now >= base.saturating_add(duration)
        );
    }
}

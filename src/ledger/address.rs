//! Program-derived addresses (PDAs) of the rewards program

pub use solana_pubkey::{ParsePubkeyError, Pubkey};

/// Serde adapter writing addresses as base58 strings, the way the
/// leaderboard and the indexed event buffer carry them
pub mod base58 {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Pubkey;

    pub fn serialize<S: Serializer>(key: &Pubkey, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(key)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Pubkey, D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// PDA layout of the rewards program
#[derive(Debug, Clone, Copy)]
pub struct ProgramAddresses {
    program_id: Pubkey,
}

impl ProgramAddresses {
    pub fn new(program_id: Pubkey) -> Self {
        Self { program_id }
    }

    pub fn program_id(&self) -> Pubkey {
        self.program_id
    }

    pub fn config(&self) -> Option<Pubkey> {
        self.derive(&[b"config"])
    }

    pub fn epoch(&self, epoch_number: u64) -> Option<Pubkey> {
        self.derive(&[b"epoch", &epoch_number.to_le_bytes()])
    }

    pub fn contributor(&self, wallet: &Pubkey) -> Option<Pubkey> {
        self.derive(&[b"contributor", wallet.as_ref()])
    }

    pub fn snapshot(&self, epoch_number: u64, wallet: &Pubkey) -> Option<Pubkey> {
        self.derive(&[b"snapshot", &epoch_number.to_le_bytes(), wallet.as_ref()])
    }

    fn derive(&self, seeds: &[&[u8]]) -> Option<Pubkey> {
        Pubkey::try_find_program_address(seeds, &self.program_id).map(|(address, _)| address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAM: Pubkey = solana_pubkey::pubkey!("GQ36eQ5oN6A47q7SpZFYGAA3HndkELmjdgsncbN1yQ9d");

    #[test]
    fn test_rejects_bad_addresses() {
        assert!("invalid_wallet".parse::<Pubkey>().is_err());
        assert!("".parse::<Pubkey>().is_err());
        // valid base58 but only a few bytes long
        assert!("abc".parse::<Pubkey>().is_err());
        // 0, O, I, l are outside the base58 alphabet
        assert!("0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl".parse::<Pubkey>().is_err());
    }

    #[test]
    fn test_config_address_matches_program_layout() {
        let (address, bump) = Pubkey::find_program_address(&[b"config"], &PROGRAM);
        assert!(!address.is_on_curve());
        assert_eq!(
            address.to_string(),
            "5bxtuN3vy2Tv6pmw1bAMzDncLvqnnwZdfVmyJxkXffFd"
        );
        assert_eq!(bump, 249);
        assert_eq!(ProgramAddresses::new(PROGRAM).config(), Some(address));
    }

    #[test]
    fn test_first_epoch_address() {
        let addresses = ProgramAddresses::new(PROGRAM);
        assert_eq!(
            addresses.epoch(1).unwrap().to_string(),
            "2X2MqQFS186BRzt7GU1e6E5PWowHmr6HhyVhhYLQSrVE"
        );
    }

    #[test]
    fn test_epoch_addresses_differ_per_epoch() {
        let addresses = ProgramAddresses::new(PROGRAM);
        assert_ne!(addresses.epoch(1), addresses.epoch(2));
        assert_ne!(addresses.config(), addresses.epoch(0));
    }

    #[test]
    fn test_base58_serde_adapter() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Holder {
            #[serde(with = "base58")]
            wallet: Pubkey,
        }

        let holder = Holder { wallet: PROGRAM };
        let json = serde_json::to_string(&holder).unwrap();
        assert_eq!(json, r#"{"wallet":"GQ36eQ5oN6A47q7SpZFYGAA3HndkELmjdgsncbN1yQ9d"}"#);
        assert_eq!(serde_json::from_str::<Holder>(&json).unwrap(), holder);
        assert!(serde_json::from_str::<Holder>(r#"{"wallet":"nope"}"#).is_err());
    }
}

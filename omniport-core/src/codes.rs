use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;

/// PIN characters: digits and capitals without the look-alikes 0/O and 1/I.
const PIN_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";
const REFERENCE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const DEFAULT_PIN_LENGTH: usize = 4;

/// Generates the human-shareable identifiers printed on tickets.
///
/// None of these are guaranteed unique by construction; the store's unique
/// indexes are the arbiter and the ledger regenerates on collision.
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    pin_length: usize,
}

impl CodeGenerator {
    pub fn new(pin_length: usize) -> Self {
        Self {
            pin_length: pin_length.max(1),
        }
    }

    /// `OMN` + epoch millis + 5 random characters.
    pub fn booking_reference(&self, now: DateTime<Utc>) -> String {
        format!("OMN{}{}", now.timestamp_millis(), random_string(REFERENCE_ALPHABET, 5))
    }

    /// `TKT-YYYYMMDD-XXXXXX`, dated by the trip's service day.
    pub fn ticket_number(&self, service_date: NaiveDate) -> String {
        format!(
            "TKT-{}-{}",
            service_date.format("%Y%m%d"),
            random_string(REFERENCE_ALPHABET, 6)
        )
    }

    pub fn tracking_pin(&self) -> String {
        random_string(PIN_ALPHABET, self.pin_length)
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_PIN_LENGTH)
    }
}

/// Canonical form of an operator-typed PIN.
pub fn normalize_pin(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_ascii_uppercase()
}

fn random_string(alphabet: &[u8], len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_pin_shape() {
        let codes = CodeGenerator::default();
        for _ in 0..200 {
            let pin = codes.tracking_pin();
            assert_eq!(pin.len(), 4);
            assert!(pin.bytes().all(|b| PIN_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_reference_and_ticket_number_format() {
        let codes = CodeGenerator::default();
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();

        let reference = codes.booking_reference(now);
        assert!(reference.starts_with(&format!("OMN{}", now.timestamp_millis())));
        assert_eq!(reference.len(), 3 + now.timestamp_millis().to_string().len() + 5);

        let ticket = codes.ticket_number(NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        assert!(ticket.starts_with("TKT-20261019-"));
        assert_eq!(ticket.len(), "TKT-20261019-".len() + 6);
    }

    #[test]
    fn test_normalize_pin() {
        assert_eq!(normalize_pin(" ab-7k "), "AB7K");
        assert_eq!(normalize_pin("X9Y2"), "X9Y2");
    }
}

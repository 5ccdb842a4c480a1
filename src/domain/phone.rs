//! Phone number normalization shared by the sheet lookups and the WhatsApp client.

const JID_SUFFIX: &str = "@s.whatsapp.net";
const COUNTRY_CODE: &str = "55";
const MATCH_SUFFIX_LEN: usize = 8;

pub fn digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// DDD + subscriber number, the shape the provider expects.
pub fn to_provider_number(raw: &str) -> String {
    let number = digits(raw);
    if number.starts_with(COUNTRY_CODE) && number.len() > 11 {
        number[COUNTRY_CODE.len()..].to_string()
    } else {
        number
    }
}

pub fn from_jid(jid: &str) -> String {
    jid.trim_end_matches(JID_SUFFIX).to_string()
}

/// A stored number matches when it ends with the last eight digits of the
/// incoming one, so country code and DDD differences are ignored.
pub fn matches(stored: &str, incoming: &str) -> bool {
    let stored = digits(stored);
    let incoming = digits(incoming);
    if stored.is_empty() || incoming.is_empty() {
        return false;
    }
    let start = incoming.len().saturating_sub(MATCH_SUFFIX_LEN);
    stored.ends_with(&incoming[start..])
}

//! Tag extraction helpers for signed events.

use nostr_sdk::prelude::*;

fn single_letter(letter: Alphabet) -> TagKind<'static> {
    TagKind::SingleLetter(SingleLetterTag::lowercase(letter))
}

/// Check if an event carries at least one tag with the given single-letter name.
pub fn has_tag(event: &Event, letter: Alphabet) -> bool {
    let kind = single_letter(letter);
    event.tags.iter().any(|t| t.kind() == kind)
}

/// All first values of the tags with the given single-letter name, in tag order.
pub fn tag_values(event: &Event, letter: Alphabet) -> Vec<&str> {
    let kind = single_letter(letter);
    event
        .tags
        .iter()
        .filter(|t| t.kind() == kind)
        .filter_map(|t| t.content())
        .collect()
}

/// Public keys referenced through "p" tags; malformed values are skipped.
pub fn referenced_pubkeys(event: &Event) -> Vec<PublicKey> {
    tag_values(event, Alphabet::P)
        .into_iter()
        .filter_map(|v| PublicKey::from_hex(v).ok())
        .collect()
}

/// Event ids referenced through "e" tags; malformed values are skipped.
pub fn referenced_events(event: &Event) -> Vec<EventId> {
    tag_values(event, Alphabet::E)
        .into_iter()
        .filter_map(|v| EventId::from_hex(v).ok())
        .collect()
}

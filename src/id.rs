use std::sync::Arc;

use nanoid::nanoid;

/// Longest id accepted from callers. Generated ids are 21 characters.
const MAX_LENGTH: usize = 64;

#[derive(thiserror::Error, Debug)]
#[error("Cast to id failed for value \"{0}\"")]
pub(crate) struct MalformedIdError(Arc<str>);

pub(crate) fn generate() -> Arc<str> {
    nanoid!().into()
}

/// Accepts ids that could have been generated by [generate]: URL safe characters only
pub(crate) fn parse(value: &str) -> Result<&str, MalformedIdError> {
    let is_well_formed = !value.is_empty()
        && value.len() <= MAX_LENGTH
        && value
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-');

    if is_well_formed {
        Ok(value)
    } else {
        Err(MalformedIdError(value.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_parse() {
        let id = generate();
        assert_eq!(id.len(), 21);
        assert_eq!(parse(&id).unwrap(), &*id);
    }

    #[test]
    fn rejects_malformed_ids() {
        for value in ["", "not an id", "../surveys", "ä", &"a".repeat(65)] {
            assert!(parse(value).is_err(), "{value:?} should be rejected");
        }
    }
}

//! Protocol-channel envelope parsing.
//!
//! ```text
//! <APIPrefix><identification char><version char><ciphertext>
//! ```
//!
//! The identification character is read as a decimal digit (anything else
//! counts as zero). Zero and multiples of ten are invalid, odd values are
//! agents and the remaining even values are managers.

use crate::domain::error::{RequestError, RequestResult};
use crate::domain::types::RequesterClass;
use crate::pipeline::dispatch::ProtocolRegistry;

/// Header fields of a well-formed envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classified<'a> {
    pub requester: RequesterClass,
    pub version: char,
    pub ciphertext: &'a str,
}

/// Numeric value of an identification character.
pub fn identification_value(identification: char) -> u32 {
    identification.to_digit(10).unwrap_or(0)
}

/// Requester class for an identification character, `None` if invalid.
pub fn requester_class(identification: char) -> Option<RequesterClass> {
    match identification_value(identification) {
        v if v % 10 == 0 => None,
        v if v % 2 == 1 => Some(RequesterClass::Agent),
        _ => Some(RequesterClass::Manager),
    }
}

/// Split `body` into its header fields and ciphertext.
pub fn classify<'a>(
    body: &'a str,
    prefix: &str,
    protocols: &ProtocolRegistry,
) -> RequestResult<Classified<'a>> {
    let rest = body.strip_prefix(prefix).ok_or(RequestError::Malformed)?;
    let mut chars = rest.chars();

    let identification = chars.next().ok_or(RequestError::Malformed)?;
    let requester = requester_class(identification).ok_or(RequestError::Malformed)?;

    let version = chars.next().ok_or(RequestError::Malformed)?;
    if !protocols.supports(version) {
        return Err(RequestError::UnsupportedProtocol {
            supported: protocols.supported_versions(),
        });
    }

    Ok(Classified {
        requester,
        version,
        ciphertext: chars.as_str(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::dispatch::{HandlerContext, ProtocolHandler, Responder};
    use async_trait::async_trait;
    use proptest::prelude::*;

    struct Noop;

    #[async_trait]
    impl ProtocolHandler for Noop {
        async fn handle_request(self: Box<Self>, _responder: &mut Responder) {}
    }

    fn noop(_: HandlerContext) -> Box<dyn ProtocolHandler> {
        Box::new(Noop)
    }

    fn protocols() -> ProtocolRegistry {
        ProtocolRegistry::new()
            .with_protocol('1', noop)
            .and_then(|r| r.with_protocol('3', noop))
            .unwrap()
    }

    #[test]
    fn test_agent_and_manager_bodies() {
        let registry = protocols();

        let agent = classify("WRAITH11deadbeef", "WRAITH", &registry).unwrap();
        assert_eq!(agent.requester, RequesterClass::Agent);
        assert_eq!(agent.version, '1');
        assert_eq!(agent.ciphertext, "deadbeef");

        let manager = classify("WRAITH83", "WRAITH", &registry).unwrap();
        assert_eq!(manager.requester, RequesterClass::Manager);
        assert_eq!(manager.version, '3');
        assert_eq!(manager.ciphertext, "");
    }

    #[test]
    fn test_missing_prefix() {
        assert_eq!(
            classify("GHOST11abc", "WRAITH", &protocols()),
            Err(RequestError::Malformed)
        );
        assert_eq!(
            classify("xWRAITH11abc", "WRAITH", &protocols()),
            Err(RequestError::Malformed)
        );
    }

    #[test]
    fn test_identification_zero_is_malformed() {
        assert_eq!(
            classify("WRAITH01abc", "WRAITH", &protocols()),
            Err(RequestError::Malformed)
        );
        // Non-digits read as zero
        assert_eq!(
            classify("WRAITHx1abc", "WRAITH", &protocols()),
            Err(RequestError::Malformed)
        );
    }

    #[test]
    fn test_unregistered_version() {
        assert_eq!(
            classify("WRAITH19abc", "WRAITH", &protocols()),
            Err(RequestError::UnsupportedProtocol {
                supported: vec!["1".into(), "3".into()]
            })
        );
    }

    #[test]
    fn test_truncated_header() {
        assert_eq!(
            classify("WRAITH", "WRAITH", &protocols()),
            Err(RequestError::Malformed)
        );
        assert_eq!(
            classify("WRAITH1", "WRAITH", &protocols()),
            Err(RequestError::Malformed)
        );
    }

    #[test]
    fn test_identification_values() {
        assert_eq!(identification_value('7'), 7);
        assert_eq!(identification_value('a'), 0);
        assert_eq!(identification_value('٣'), 0);
        assert_eq!(requester_class('0'), None);
        assert_eq!(requester_class('9'), Some(RequesterClass::Agent));
        assert_eq!(requester_class('2'), Some(RequesterClass::Manager));
    }

    proptest! {
        #[test]
        fn prop_foreign_prefix_is_malformed(body in "[a-z0-9]{0,40}") {
            prop_assert_eq!(
                classify(&body, "WRAITH", &protocols()),
                Err(RequestError::Malformed)
            );
        }

        #[test]
        fn prop_identification_parity(id in any::<char>(), tail in "[0-9a-f]{0,64}") {
            let body = format!("WRAITH{id}1{tail}");
            let result = classify(&body, "WRAITH", &protocols());
            match id.to_digit(10) {
                Some(v) if v % 10 != 0 => {
                    let classified = result.unwrap();
                    let expected = if v % 2 == 1 {
                        RequesterClass::Agent
                    } else {
                        RequesterClass::Manager
                    };
                    prop_assert_eq!(classified.requester, expected);
                    prop_assert_eq!(classified.ciphertext, tail.as_str());
                }
                _ => prop_assert_eq!(result, Err(RequestError::Malformed)),
            }
        }

        #[test]
        fn prop_unregistered_version_lists_supported(
            id in "[13579]",
            version in any::<char>().prop_filter("unregistered", |c| *c != '1' && *c != '3'),
        ) {
            let body = format!("WRAITH{id}{version}abc");
            prop_assert_eq!(
                classify(&body, "WRAITH", &protocols()),
                Err(RequestError::UnsupportedProtocol {
                    supported: vec!["1".to_string(), "3".to_string()],
                })
            );
        }
    }
}

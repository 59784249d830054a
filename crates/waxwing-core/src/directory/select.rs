//! Picking the current publication out of a set of posts.

use std::collections::BTreeMap;

use tracing::debug;
use waxwing_crypto::{EccPubKey, MinifiedKey, Verify};
use waxwing_proto::{BoardRecord, PublicationRecord};

use super::BoardPost;
use crate::CoreError;

/// A verified publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedIdentity {
    /// The publication as posted
    pub record: PublicationRecord,
    /// Account that posted it
    pub platform_id: String,
    /// Identity rebuilt from the key posts
    pub key: EccPubKey,
}

#[derive(Default)]
struct Triple {
    encrypt: Option<(BoardRecord, String)>,
    sign: Option<(BoardRecord, String)>,
    signature: Option<(BoardRecord, String)>,
}

impl Triple {
    fn slot(&mut self, record: &BoardRecord) -> &mut Option<(BoardRecord, String)> {
        match record {
            BoardRecord::EncryptKey { .. } => &mut self.encrypt,
            BoardRecord::SignKey { .. } => &mut self.sign,
            BoardRecord::Signature { .. } => &mut self.signature,
        }
    }

    /// The three records and their shared author, when complete and
    /// consistent.
    fn complete(&self) -> Option<(&BoardRecord, &BoardRecord, &BoardRecord, &str)> {
        let (encrypt, id_e) = self.encrypt.as_ref()?;
        let (sign, id_s) = self.sign.as_ref()?;
        let (signature, id_g) = self.signature.as_ref()?;
        (id_e == id_s && id_s == id_g).then_some((encrypt, sign, signature, id_e.as_str()))
    }
}

/// Select and verify `username`'s current publication.
///
/// Posts not authored by `username` or not parseable are ignored. Among
/// timestamps with all three records from one account, the newest wins;
/// for duplicate markers at one timestamp the first post seen (the newest)
/// is kept.
///
/// Returns `Ok(None)` when no complete publication exists.
///
/// # Errors
///
/// - `NoIdent`: the newest complete publication does not verify
pub fn select_publication(
    username: &str,
    posts: &[BoardPost],
) -> Result<Option<FetchedIdentity>, CoreError> {
    let mut by_timestamp: BTreeMap<u64, Triple> = BTreeMap::new();

    for post in posts.iter().filter(|post| post.author_username == username) {
        let Ok(record) = BoardRecord::parse(&post.text) else {
            debug!(user = username, "skipping malformed post");
            continue;
        };
        let slot = by_timestamp.entry(record.timestamp()).or_default().slot(&record);
        if slot.is_none() {
            *slot = Some((record, post.author_id.clone()));
        }
    }

    let newest = by_timestamp.values().rev().find_map(Triple::complete);
    let Some((encrypt, sign, signature, platform_id)) = newest else {
        return Ok(None);
    };

    let noident = || CoreError::NoIdent { user: username.to_string() };
    let record = PublicationRecord::from_posts(encrypt, sign, signature).map_err(|_| noident())?;
    let minified = MinifiedKey { encrypt: record.encrypt_key.clone(), sign: record.sign_key.clone() };
    let key = EccPubKey::unminify(&minified).map_err(|_| noident())?;
    key.verify_signature(record.signing_input(username, platform_id).as_bytes(), &record.signature)
        .map_err(|_| noident())?;

    Ok(Some(FetchedIdentity { record, platform_id: platform_id.to_string(), key }))
}


#[cfg(test)]
mod tests {
    use waxwing_crypto::{EccKeyPair, Sign};

    use super::*;

    fn pair() -> EccKeyPair {
        EccKeyPair::from_secrets([1; 32], [2; 32])
    }

    fn publication(pair: &EccKeyPair, user: &str, platform_id: &str, ts: u64) -> Vec<BoardPost> {
        let minified = pair.public().minify();
        let exp = ts + 1_000;
        let message = PublicationRecord::signed_message(
            user,
            platform_id,
            &minified.encrypt,
            &minified.sign,
            ts,
            exp,
        );
        let record = PublicationRecord {
            encrypt_key: minified.encrypt,
            sign_key: minified.sign,
            timestamp: ts,
            expiration: exp,
            signature: pair.sign(message.as_bytes()),
        };
        record
            .posts()
            .iter()
            .map(|post| BoardPost {
                text: post.to_string(),
                author_id: platform_id.to_string(),
                author_username: user.to_string(),
            })
            .collect()
    }

    #[test]
    fn newest_complete_publication_wins() {
        let old = pair();
        let new = EccKeyPair::from_secrets([3; 32], [4; 32]);
        let mut posts = publication(&new, "bob", "42", 2_000);
        posts.extend(publication(&old, "bob", "42", 1_000));

        let fetched = select_publication("bob", &posts).unwrap().unwrap();
        assert_eq!(fetched.record.timestamp, 2_000);
        assert!(fetched.key.same_key(&new.public()));
        assert_eq!(fetched.platform_id, "42");
    }

    #[test]
    fn incomplete_newer_triple_is_skipped() {
        let mut posts = publication(&pair(), "bob", "42", 2_000);
        posts.remove(2);
        posts.extend(publication(&pair(), "bob", "42", 1_000));

        let fetched = select_publication("bob", &posts).unwrap().unwrap();
        assert_eq!(fetched.record.timestamp, 1_000);
    }

    #[test]
    fn mixed_platform_ids_do_not_form_a_triple() {
        let mut posts = publication(&pair(), "bob", "42", 1_000);
        posts[1].author_id = "43".into();
        assert_eq!(select_publication("bob", &posts).unwrap(), None);
    }

    #[test]
    fn other_authors_and_noise_are_ignored() {
        let mut posts = vec![BoardPost {
            text: "hello world".into(),
            author_id: "42".into(),
            author_username: "bob".into(),
        }];
        posts.extend(publication(&pair(), "mallory", "66", 3_000));
        posts.extend(publication(&pair(), "bob", "42", 1_000));

        let fetched = select_publication("bob", &posts).unwrap().unwrap();
        assert_eq!(fetched.record.timestamp, 1_000);
    }

    #[test]
    fn bad_signature_is_noident() {
        // Signed for platform id 42, posted from account 43.
        let mut posts = publication(&pair(), "bob", "42", 1_000);
        for post in &mut posts {
            post.author_id = "43".into();
        }
        assert_eq!(
            select_publication("bob", &posts).unwrap_err(),
            CoreError::NoIdent { user: "bob".into() }
        );
    }
}

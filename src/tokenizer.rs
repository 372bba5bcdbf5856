//! Tokenizer loading and greedy longest-prefix encoding.

use crate::error::{Gpt2Error, Result};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Tokenizer holding the vocabulary; a token's id is its index.
///
/// Entries are raw bytes: byte-level tokens may hold a fragment of a UTF-8
/// sequence, so text is only rebuilt once whole tokens are concatenated.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    pub vocab: Vec<Vec<u8>>,
}

impl Tokenizer {
    pub fn new(vocab: Vec<Vec<u8>>) -> Self {
        Tokenizer { vocab }
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    /// Encode text by repeatedly taking the vocabulary entry that shares the
    /// longest prefix with the remaining input.
    ///
    /// Stops early, returning what was encoded so far, if nothing in the
    /// vocabulary matches the next byte.
    pub fn encode(&self, text: &str) -> Vec<usize> {
        let mut rest = text.as_bytes();
        let mut tokens = Vec::new();

        while !rest.is_empty() {
            let (id, overlap) = self.longest_match(rest);
            if overlap == 0 {
                warn!(
                    encoded = tokens.len(),
                    remaining = rest.len(),
                    "no vocabulary entry matches, truncating prompt"
                );
                break;
            }
            tokens.push(id);
            rest = &rest[overlap..];
        }

        tokens
    }

    /// Finds the entry with the longest common prefix with `s`.
    ///
    /// On equal overlap an entry matched in full beats one matched only
    /// partially; otherwise the lowest id wins.
    fn longest_match(&self, s: &[u8]) -> (usize, usize) {
        let mut best = 0;
        let mut overlap = 0;
        let mut full = false;

        for (i, t) in self.vocab.iter().enumerate() {
            let j = common_prefix(s, t);
            if j == 0 {
                continue;
            }
            let is_full = j == t.len();
            if j > overlap || (j == overlap && is_full && !full) {
                best = i;
                overlap = j;
                full = is_full;
            }
        }

        (best, overlap)
    }

    /// Decode token ids to their vocabulary entries.
    pub fn decode(&self, tokens: &[usize]) -> Result<Vec<&[u8]>> {
        tokens.iter().map(|&t| self.token_bytes(t)).collect()
    }

    /// Decode a single token id.
    pub fn token_bytes(&self, token: usize) -> Result<&[u8]> {
        self.vocab
            .get(token)
            .map(|t| t.as_slice())
            .ok_or(Gpt2Error::TokenOutOfRange {
                token,
                vocab_size: self.vocab.len(),
            })
    }
}

#[inline]
fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Load a vocabulary of null-terminated byte strings.
///
/// Bytes after the last terminator are ignored.
pub fn load_tokenizer<P: AsRef<Path>>(path: P) -> Result<Tokenizer> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| Gpt2Error::Load {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let tokenizer = Tokenizer::new(parse_vocab(&bytes));
    info!(path = %path.display(), tokens = tokenizer.vocab_size(), "loaded tokenizer");
    Ok(tokenizer)
}

fn parse_vocab(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut parts: Vec<&[u8]> = bytes.split(|&b| b == 0).collect();
    // The piece after the final terminator is either empty or unterminated.
    parts.pop();
    parts.into_iter().map(|p| p.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> Tokenizer {
        words(&["H", "He", "Hello", "Hellooo", ",", " ", " w", " world", "o", "l"])
    }

    fn words(vocab: &[&str]) -> Tokenizer {
        Tokenizer::new(vocab.iter().map(|s| s.as_bytes().to_vec()).collect())
    }

    #[test]
    fn test_encode_longest_prefix() {
        let tok = toy();
        assert_eq!(tok.encode("Hello, world"), vec![2, 4, 7]);
    }

    #[test]
    fn test_longer_partial_overlap_wins() {
        // " world" overlaps " wo" by three bytes, " w" only by two.
        let tok = toy();
        assert_eq!(tok.encode(" wo"), vec![7]);
        assert_eq!(tok.encode(" wl"), vec![6, 9]);
    }

    #[test]
    fn test_full_match_beats_partial_match() {
        // "Hello" and "Hellooo" both overlap "Hello!" by five bytes.
        let tok = words(&["Hellooo", "Hello", "!"]);
        assert_eq!(tok.encode("Hello!"), vec![1, 2]);
    }

    #[test]
    fn test_equal_matches_take_lowest_id() {
        let tok = words(&["ab", "ab", "axe", "ayy"]);
        assert_eq!(tok.encode("ab"), vec![0]);
        // Partial matches of equal overlap: first one wins.
        assert_eq!(tok.encode("a"), vec![0]);
    }

    #[test]
    fn test_encode_stops_on_unknown_byte() {
        let tok = toy();
        assert_eq!(tok.encode("He?llo"), vec![1]);
        assert!(tok.encode("?").is_empty());
        assert!(tok.encode("").is_empty());
    }

    #[test]
    fn test_encode_partial_multibyte_overlap() {
        // "é" and "è" share their first UTF-8 byte.
        let tok = words(&["é"]);
        assert_eq!(tok.encode("è"), vec![0]);
    }

    #[test]
    fn test_round_trip_single_entries() {
        let tok = toy();
        for t in &tok.vocab {
            let s = std::str::from_utf8(t).unwrap();
            assert_eq!(tok.decode(&tok.encode(s)).unwrap().concat(), *t);
        }
    }

    #[test]
    fn test_decode_out_of_range() {
        let tok = toy();
        assert_eq!(tok.decode(&[2, 5]).unwrap(), vec![&b"Hello"[..], b" "]);
        assert!(matches!(
            tok.decode(&[0, 10]),
            Err(Gpt2Error::TokenOutOfRange { token: 10, vocab_size: 10 })
        ));
    }

    #[test]
    fn test_parse_vocab() {
        assert_eq!(
            parse_vocab(b"a\0bc\0\0tail"),
            vec![b"a".to_vec(), b"bc".to_vec(), vec![]]
        );
        assert!(parse_vocab(b"").is_empty());
    }

    #[test]
    fn test_character_split_across_byte_tokens() {
        // "日" is E6 97 A5; each byte is its own entry.
        let path = std::env::temp_dir().join(format!("gpt2-rs-vocab-{}.dat", std::process::id()));
        fs::write(&path, b"\xE6\0\x97\0\xA5\0a\0").unwrap();
        let tok = load_tokenizer(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(tok.vocab_size(), 4);
        assert_ne!(tok.vocab[0], tok.vocab[1]);
        let ids = tok.encode("日a");
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(tok.decode(&ids).unwrap().concat(), "日a".as_bytes());
        assert_eq!(tok.decode(&ids[..1]).unwrap().concat(), vec![0xE6u8]);
    }

    #[test]
    fn test_missing_vocab_is_load_error() {
        let path = std::env::temp_dir().join("gpt2-rs-no-such-dir/tokens.dat");
        match load_tokenizer(&path) {
            Err(Gpt2Error::Load { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected load failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_known_encoding_standard_vocab() {
        let path = Path::new("124M/tokens.dat");
        if !path.exists() {
            return;
        }
        let tok = load_tokenizer(path).unwrap();
        assert_eq!(tok.vocab_size(), 50257);
        for (s, ids) in [
            (" king", vec![5822]),
            (" queen", vec![16599]),
            (" nuclear", vec![4523]),
            ("Hello, world", vec![15496, 11, 995]),
        ] {
            let tokens = tok.encode(s);
            assert_eq!(tokens, ids);
            assert_eq!(tok.decode(&tokens).unwrap().concat(), s.as_bytes());
        }
    }
}

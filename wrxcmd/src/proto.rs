//! Aide au décodage de la grammaire `clé=valeur` et au formatage `MSG`

use crate::traits::ResponseSink;
use std::borrow::Cow;

/// Décode une valeur encodée en pourcent ; une séquence invalide est
/// conservée telle quelle plutôt que de faire échouer la commande
pub(crate) fn decode(s: &str) -> String {
    match urlencoding::decode(s) {
        Ok(Cow::Borrowed(b)) => b.to_string(),
        Ok(Cow::Owned(o)) => o,
        Err(_) => s.to_string(),
    }
}

/// Encode une valeur pour inclusion dans une réponse `MSG`
pub(crate) fn encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Découpe les paramètres `clé=valeur` d'une ligne de commande.
///
/// Les valeurs ne contiennent jamais d'espace sur le fil (elles sont
/// encodées en pourcent), le découpage par blancs suffit. Un jeton sans `=`
/// est ignoré.
pub(crate) fn kv_tokens(args: &str) -> Vec<(&str, &str)> {
    args.split_whitespace()
        .filter_map(|tok| tok.split_once('='))
        .collect()
}

/// Envoie une réponse `MSG clé=valeur`
pub(crate) fn send_msg(sink: &mut dyn ResponseSink, key: &str, value: impl std::fmt::Display) {
    sink.send(format!("MSG {key}={value}"));
}

/// Envoie une réponse `MSG` dont la valeur est encodée en pourcent
pub(crate) fn send_msg_encoded(sink: &mut dyn ResponseSink, key: &str, value: &str) {
    sink.send(format!("MSG {key}={}", encode(value)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_tokens() {
        let toks = kv_tokens("t=kiwi p=mot%20de%20passe");
        assert_eq!(toks, vec![("t", "kiwi"), ("p", "mot%20de%20passe")]);
    }

    #[test]
    fn test_kv_tokens_skips_bare_words() {
        assert_eq!(kv_tokens("oops t=admin"), vec![("t", "admin")]);
    }

    #[test]
    fn test_decode_roundtrip() {
        assert_eq!(decode("mot%20de%20passe"), "mot de passe");
        assert_eq!(decode(&encode("a=b c")), "a=b c");
    }

    #[test]
    fn test_decode_keeps_invalid_sequences() {
        assert_eq!(decode("100%"), "100%");
    }
}

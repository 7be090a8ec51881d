//! Recovering the assistant's reply from raw generated text.

use super::template::TokenSet;

/// Extract the reply from everything a backend has produced so far.
///
/// Takes the text after the last assistant delimiter (or the whole buffer if
/// there is none), removes any echoed user, assistant or end delimiters, and
/// trims surrounding whitespace.
pub fn extract_reply(buffer: &str, tokens: &TokenSet) -> String {
    let marker = tokens.assistant.as_str();
    let mut reply = match (marker.is_empty(), buffer.rfind(marker)) {
        (false, Some(index)) => &buffer[index + marker.len()..],
        _ => buffer,
    }
    .to_string();

    for token in [&tokens.assistant, &tokens.user, &tokens.end] {
        if !token.is_empty() {
            reply = reply.replace(token.as_str(), "");
        }
    }

    reply.trim().to_string()
}

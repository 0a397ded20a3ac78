use chrono::Utc;
use openssl::sha::sha256;

/// Builds the `Authorization: VBS <access>:hex(sha256(method||access||secret||date))`
/// header value and the matching `Date:` (RFC 1123, UTC) value.
pub fn sign(method: &str, access_key: &str, secret_key: &str) -> (String, String) {
    let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    let mut input = String::new();
    input.push_str(method);
    input.push_str(access_key);
    input.push_str(secret_key);
    input.push_str(&date);
    let digest = sha256(input.as_bytes());
    let header = format!("VBS {}:{}", access_key, hex::encode(digest));
    (header, date)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_for_same_inputs_and_date() {
        let date = "Thu, 01 Jan 2026 00:00:00 GMT";
        let make = |date: &str| {
            let mut input = String::new();
            input.push_str("GET");
            input.push_str("ak");
            input.push_str("sk");
            input.push_str(date);
            hex::encode(sha256(input.as_bytes()))
        };
        assert_eq!(make(date), make(date));
    }
}

//! SCRAM-SHA-256 and SCRAM-SHA-256-PLUS client exchange (RFC 5802, RFC 7677).
//!
//! Channel binding uses `tls-server-end-point` (RFC 5929): the binding data
//! is the SHA-256 digest of the server's leaf certificate in DER form, taken
//! from the transport after the TLS handshake.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};
use stringprep::saslprep;

use crate::config::ChannelBindingPolicy;
use crate::error::{Error, Result};

pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";
pub const SCRAM_SHA_256_PLUS: &str = "SCRAM-SHA-256-PLUS";

/// RFC 7677 mandates at least 4096 iterations.
const MIN_ITERATIONS: u32 = 4096;

const GS2_NO_BINDING: &str = "n,,";
const GS2_TLS_SERVER_END_POINT: &str = "p=tls-server-end-point,,";

/// Selected SASL mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    ScramSha256,
    ScramSha256Plus,
}

impl Mechanism {
    pub fn as_str(self) -> &'static str {
        match self {
            Mechanism::ScramSha256 => SCRAM_SHA_256,
            Mechanism::ScramSha256Plus => SCRAM_SHA_256_PLUS,
        }
    }
}

/// Pick a mechanism from the server's advertised list.
///
/// PLUS is selected whenever the server offers it and channel-binding data is
/// available. With `ChannelBindingPolicy::Required`, anything less fails
/// before the exchange starts, so no password-derived material is ever sent.
pub fn select_mechanism(
    advertised: &[&str],
    policy: ChannelBindingPolicy,
    cbind_data: Option<[u8; 32]>,
) -> Result<Mechanism> {
    let has_plain = advertised.iter().any(|m| *m == SCRAM_SHA_256);
    let has_plus = advertised.iter().any(|m| *m == SCRAM_SHA_256_PLUS);

    if has_plus && cbind_data.is_some() {
        return Ok(Mechanism::ScramSha256Plus);
    }
    if policy == ChannelBindingPolicy::Required {
        return Err(Error::ChannelBindingRequired);
    }
    if has_plain {
        return Ok(Mechanism::ScramSha256);
    }
    Err(Error::Authentication(format!(
        "no supported SASL mechanism; server offers: {}",
        advertised.join(", ")
    )))
}

/// Escape a saslname: "," and "=" are reserved (RFC 5802 section 5.1).
fn escape_saslname(name: &str) -> String {
    name.replace('=', "=3D").replace(',', "=2C")
}

/// Driver for one SCRAM exchange.
pub struct ScramAuthenticator {
    username: String,
    password: String,
    nonce: String,
    mechanism: Mechanism,
    cbind_data: Option<[u8; 32]>,
    server_first: Option<String>,
    auth_message: Option<String>,
    salted_password: Option<[u8; 32]>,
}

impl std::fmt::Debug for ScramAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScramAuthenticator")
            .field("username", &self.username)
            .field("mechanism", &self.mechanism)
            .field("password", &"[redacted]")
            .finish_non_exhaustive()
    }
}

impl ScramAuthenticator {
    /// Create an authenticator with a fresh random nonce.
    ///
    /// The username is normally empty: PostgreSQL takes the user from the
    /// startup packet and ignores the SCRAM `n=` attribute. The password is
    /// normalized with SASLprep; prohibited code points are rejected here,
    /// unassigned ones pass through.
    pub fn new(
        username: &str,
        password: &str,
        mechanism: Mechanism,
        cbind_data: Option<[u8; 32]>,
    ) -> Result<Self> {
        use rand::RngCore;

        let mut nonce_bytes = [0u8; 18];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        Self::with_nonce(username, password, mechanism, cbind_data, &BASE64.encode(nonce_bytes))
    }

    /// Create an authenticator with a caller-chosen nonce (for test vectors).
    pub(crate) fn with_nonce(
        username: &str,
        password: &str,
        mechanism: Mechanism,
        cbind_data: Option<[u8; 32]>,
        nonce: &str,
    ) -> Result<Self> {
        if mechanism == Mechanism::ScramSha256Plus && cbind_data.is_none() {
            return Err(Error::Authentication(
                "SCRAM-SHA-256-PLUS selected without channel-binding data".into(),
            ));
        }

        let password = saslprep(password)
            .map_err(|e| Error::Authentication(format!("password failed SASLprep: {}", e)))?
            .into_owned();
        let username = match username {
            "" => String::new(),
            name => escape_saslname(
                &saslprep(name)
                    .map_err(|e| Error::Authentication(format!("username failed SASLprep: {}", e)))?,
            ),
        };

        Ok(Self {
            username,
            password,
            nonce: nonce.to_string(),
            mechanism,
            cbind_data,
            server_first: None,
            auth_message: None,
            salted_password: None,
        })
    }

    pub fn mechanism(&self) -> Mechanism {
        self.mechanism
    }

    fn gs2_header(&self) -> &'static str {
        match self.mechanism {
            Mechanism::ScramSha256 => GS2_NO_BINDING,
            Mechanism::ScramSha256Plus => GS2_TLS_SERVER_END_POINT,
        }
    }

    fn client_first_bare(&self) -> String {
        format!("n={},r={}", self.username, self.nonce)
    }

    /// The client-first-message for SASLInitialResponse.
    pub fn client_first_message(&self) -> String {
        format!("{}{}", self.gs2_header(), self.client_first_bare())
    }

    /// The `c=` attribute value: base64 of the GS2 header, with the
    /// channel-binding data appended for PLUS.
    fn channel_binding_attr(&self) -> String {
        match self.cbind_data {
            Some(data) if self.mechanism == Mechanism::ScramSha256Plus => {
                let mut bound = self.gs2_header().as_bytes().to_vec();
                bound.extend_from_slice(&data);
                BASE64.encode(bound)
            }
            _ => BASE64.encode(self.gs2_header()),
        }
    }

    /// Process the server-first-message and produce the client-final-message.
    pub fn handle_server_first(&mut self, data: &[u8]) -> Result<String> {
        let server_first = simdutf8::compat::from_utf8(data)
            .map_err(|e| Error::Authentication(format!("invalid server-first-message: {}", e)))?;
        self.server_first = Some(server_first.to_string());

        let mut combined_nonce = None;
        let mut salt_b64 = None;
        let mut iterations = None;

        for attr in server_first.split(',') {
            if let Some(value) = attr.strip_prefix("r=") {
                combined_nonce = Some(value);
            } else if let Some(value) = attr.strip_prefix("s=") {
                salt_b64 = Some(value);
            } else if let Some(value) = attr.strip_prefix("i=") {
                iterations = Some(value.parse::<u32>().map_err(|_| {
                    Error::Authentication(format!("invalid iteration count: {}", value))
                })?);
            }
        }

        let combined_nonce = combined_nonce
            .ok_or_else(|| Error::Authentication("server-first-message missing nonce".into()))?;
        let salt_b64 = salt_b64
            .ok_or_else(|| Error::Authentication("server-first-message missing salt".into()))?;
        let iterations = iterations
            .ok_or_else(|| Error::Authentication("server-first-message missing iterations".into()))?;

        if !combined_nonce.starts_with(&self.nonce) {
            return Err(Error::Authentication(
                "server nonce does not start with client nonce".into(),
            ));
        }
        if iterations < MIN_ITERATIONS {
            return Err(Error::Authentication(format!(
                "iteration count {} below minimum {}",
                iterations, MIN_ITERATIONS
            )));
        }

        let salt = BASE64
            .decode(salt_b64)
            .map_err(|e| Error::Authentication(format!("invalid salt: {}", e)))?;

        // SaltedPassword := Hi(Normalize(password), salt, i)
        let mut salted_password = [0u8; 32];
        pbkdf2_hmac::<Sha256>(self.password.as_bytes(), &salt, iterations, &mut salted_password);
        self.salted_password = Some(salted_password);

        // ClientKey := HMAC(SaltedPassword, "Client Key")
        let client_key = hmac_sha256(&salted_password, b"Client Key")?;
        // StoredKey := H(ClientKey)
        let stored_key = Sha256::digest(client_key);

        let client_final_without_proof =
            format!("c={},r={}", self.channel_binding_attr(), combined_nonce);

        // AuthMessage := client-first-bare , server-first , client-final-without-proof
        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare(),
            server_first,
            client_final_without_proof
        );
        self.auth_message = Some(auth_message.clone());

        // ClientSignature := HMAC(StoredKey, AuthMessage)
        let client_signature = hmac_sha256(&stored_key, auth_message.as_bytes())?;

        // ClientProof := ClientKey XOR ClientSignature
        let mut client_proof = [0u8; 32];
        for (i, byte) in client_proof.iter_mut().enumerate() {
            *byte = client_key[i] ^ client_signature[i];
        }

        Ok(format!(
            "{},p={}",
            client_final_without_proof,
            BASE64.encode(client_proof)
        ))
    }

    /// Verify the server-final-message signature.
    pub fn handle_server_final(&self, data: &[u8]) -> Result<()> {
        let server_final = simdutf8::compat::from_utf8(data)
            .map_err(|e| Error::Authentication(format!("invalid server-final-message: {}", e)))?;

        if let Some(err) = server_final.strip_prefix("e=") {
            return Err(Error::Authentication(format!("server rejected proof: {}", err)));
        }
        let signature_b64 = server_final.strip_prefix("v=").ok_or_else(|| {
            Error::Authentication("malformed server-final-message".into())
        })?;
        let server_signature = BASE64
            .decode(signature_b64)
            .map_err(|e| Error::Authentication(format!("invalid server signature: {}", e)))?;

        let salted_password = self
            .salted_password
            .as_ref()
            .ok_or_else(|| Error::Authentication("server-final before server-first".into()))?;
        let auth_message = self
            .auth_message
            .as_ref()
            .ok_or_else(|| Error::Authentication("server-final before server-first".into()))?;

        // ServerSignature := HMAC(HMAC(SaltedPassword, "Server Key"), AuthMessage)
        let server_key = hmac_sha256(salted_password, b"Server Key")?;
        let expected = hmac_sha256(&server_key, auth_message.as_bytes())?;

        if server_signature.as_slice() != expected.as_slice() {
            return Err(Error::Authentication(
                "server signature verification failed".into(),
            ));
        }

        Ok(())
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32]> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key)
        .map_err(|e| Error::Authentication(format!("HMAC error: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7677 section 3 test vector (user "user", password "pencil").
    const RFC_NONCE: &str = "rOprNGfwEbeRWgbNEkqO";
    const RFC_SERVER_FIRST: &str =
        "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";
    const RFC_CLIENT_FINAL: &str =
        "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ=";
    const RFC_SERVER_FINAL: &str = "v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=";

    fn rfc_authenticator() -> ScramAuthenticator {
        ScramAuthenticator::with_nonce("user", "pencil", Mechanism::ScramSha256, None, RFC_NONCE)
            .unwrap()
    }

    #[test]
    fn rfc7677_client_first() {
        let scram = rfc_authenticator();
        assert_eq!(
            scram.client_first_message(),
            "n,,n=user,r=rOprNGfwEbeRWgbNEkqO"
        );
    }

    #[test]
    fn rfc7677_full_exchange() {
        let mut scram = rfc_authenticator();
        let client_final = scram
            .handle_server_first(RFC_SERVER_FIRST.as_bytes())
            .unwrap();
        assert_eq!(client_final, RFC_CLIENT_FINAL);
        scram.handle_server_final(RFC_SERVER_FINAL.as_bytes()).unwrap();
    }

    #[test]
    fn bad_server_signature_rejected() {
        let mut scram = rfc_authenticator();
        scram
            .handle_server_first(RFC_SERVER_FIRST.as_bytes())
            .unwrap();
        let err = scram
            .handle_server_final(b"v=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=")
            .unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[test]
    fn server_error_attribute_rejected() {
        let mut scram = rfc_authenticator();
        scram
            .handle_server_first(RFC_SERVER_FIRST.as_bytes())
            .unwrap();
        let err = scram
            .handle_server_final(b"e=invalid-proof")
            .unwrap_err();
        assert!(err.to_string().contains("invalid-proof"));
    }

    #[test]
    fn nonce_prefix_verified() {
        let mut scram = rfc_authenticator();
        let err = scram
            .handle_server_first(b"r=stolenNonce,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096")
            .unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[test]
    fn low_iteration_count_rejected() {
        let mut scram = rfc_authenticator();
        let err = scram
            .handle_server_first(
                format!("r={}more,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=1024", RFC_NONCE).as_bytes(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("iteration count"));
    }

    #[test]
    fn plus_gs2_header_and_binding_attr() {
        let cbind = [0x42u8; 32];
        let mut scram = ScramAuthenticator::with_nonce(
            "",
            "pencil",
            Mechanism::ScramSha256Plus,
            Some(cbind),
            RFC_NONCE,
        )
        .unwrap();
        assert!(scram
            .client_first_message()
            .starts_with("p=tls-server-end-point,,"));

        let server_first = format!("r={}ext,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096", RFC_NONCE);
        let client_final = scram.handle_server_first(server_first.as_bytes()).unwrap();

        let mut expected = b"p=tls-server-end-point,,".to_vec();
        expected.extend_from_slice(&cbind);
        let expected_attr = format!("c={}", BASE64.encode(expected));
        assert!(client_final.starts_with(&expected_attr));
    }

    #[test]
    fn plus_without_binding_data_is_invalid() {
        let err = ScramAuthenticator::with_nonce(
            "",
            "pencil",
            Mechanism::ScramSha256Plus,
            None,
            RFC_NONCE,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[test]
    fn prohibited_password_code_points_rejected() {
        let err =
            ScramAuthenticator::with_nonce("", "pass\u{7f}word", Mechanism::ScramSha256, None, RFC_NONCE)
                .unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[test]
    fn mechanism_selection() {
        let both = ["SCRAM-SHA-256", "SCRAM-SHA-256-PLUS"];
        let plain_only = ["SCRAM-SHA-256"];
        let cbind = Some([0u8; 32]);

        assert_eq!(
            select_mechanism(&both, ChannelBindingPolicy::Preferred, cbind).unwrap(),
            Mechanism::ScramSha256Plus
        );
        assert_eq!(
            select_mechanism(&plain_only, ChannelBindingPolicy::Preferred, cbind).unwrap(),
            Mechanism::ScramSha256
        );
        // PLUS advertised but no fingerprint available
        assert_eq!(
            select_mechanism(&both, ChannelBindingPolicy::Preferred, None).unwrap(),
            Mechanism::ScramSha256
        );
        assert!(matches!(
            select_mechanism(&plain_only, ChannelBindingPolicy::Required, cbind).unwrap_err(),
            Error::ChannelBindingRequired
        ));
        assert!(matches!(
            select_mechanism(&both, ChannelBindingPolicy::Required, None).unwrap_err(),
            Error::ChannelBindingRequired
        ));
        assert!(matches!(
            select_mechanism(&["OTHER"], ChannelBindingPolicy::Preferred, None).unwrap_err(),
            Error::Authentication(_)
        ));
    }

    #[test]
    fn saslname_escaping() {
        let scram = ScramAuthenticator::with_nonce(
            "a=b,c",
            "pencil",
            Mechanism::ScramSha256,
            None,
            RFC_NONCE,
        )
        .unwrap();
        assert!(scram.client_first_message().contains("n=a=3Db=2Cc,"));
    }
}

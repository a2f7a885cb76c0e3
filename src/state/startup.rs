//! Startup and authentication state machine.
//!
//! Sans-I/O: the connection reads frames, filters the asynchronous messages
//! (notices, parameter statuses) and feeds everything else to [`StartupFlow`],
//! writing the reply buffer whenever a step asks for it. The SSLRequest
//! preamble and TLS handshake are a transport concern and happen before this
//! flow starts.

use std::sync::Arc;

use crate::config::{ChannelBindingPolicy, Config, Credential};
use crate::error::{Error, Result};
use crate::logger::{LogLevel, LogRecord, Logger};
use crate::protocol::backend::{
    msg_type, AuthenticationMessage, BackendKeyData, ErrorResponse, ReadyForQuery,
};
use crate::protocol::frontend::{
    md5_password, write_password, write_sasl_initial_response, write_sasl_response, write_startup,
};
use crate::protocol::types::TransactionStatus;
use crate::sasl::{select_mechanism, Mechanism, ScramAuthenticator};

/// What the caller should do after feeding a message to the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Write the flow's reply buffer to the server.
    Reply,
    /// Read the next message.
    Continue,
    /// Startup is complete; the session is ready.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowState {
    AwaitingAuthRequest,
    AwaitingSaslContinue,
    AwaitingSaslFinal,
    AwaitingAuthOk,
    AwaitingReady,
    Complete,
}

/// Drives startup: StartupMessage, the authentication exchange, and the
/// BackendKeyData/ReadyForQuery tail.
pub struct StartupFlow {
    state: FlowState,
    config: Config,
    cbind_data: Option<[u8; 32]>,
    logger: Arc<dyn Logger>,
    scram: Option<ScramAuthenticator>,
    backend_pid: Option<u32>,
    backend_secret: Option<u32>,
    transaction_status: TransactionStatus,
    write_buffer: Vec<u8>,
}

impl StartupFlow {
    pub fn new(config: Config, cbind_data: Option<[u8; 32]>, logger: Arc<dyn Logger>) -> Self {
        Self {
            state: FlowState::AwaitingAuthRequest,
            config,
            cbind_data,
            logger,
            scram: None,
            backend_pid: None,
            backend_secret: None,
            transaction_status: TransactionStatus::Idle,
            write_buffer: Vec::new(),
        }
    }

    /// Build the StartupMessage; the caller writes [`Self::reply`] first.
    pub fn start(&mut self) {
        self.write_buffer.clear();
        write_startup(
            &mut self.write_buffer,
            &[
                ("user", &self.config.user),
                ("database", &self.config.database),
                ("application_name", &self.config.application_name),
                ("client_encoding", "UTF8"),
            ],
        );
    }

    /// The bytes to send after `start()` or a `Step::Reply`.
    pub fn reply(&self) -> &[u8] {
        &self.write_buffer
    }

    pub fn backend_key(&self) -> Option<(u32, u32)> {
        self.backend_pid.zip(self.backend_secret)
    }

    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    /// Feed one synchronous backend message to the flow.
    pub fn step(&mut self, tag: u8, payload: &[u8]) -> Result<Step> {
        match tag {
            msg_type::ERROR_RESPONSE => Err(ErrorResponse::parse(payload)?.into_error()),
            msg_type::AUTHENTICATION => self.handle_authentication(payload),
            msg_type::BACKEND_KEY_DATA if self.state == FlowState::AwaitingReady => {
                let key = BackendKeyData::parse(payload)?;
                self.backend_pid = Some(key.process_id());
                self.backend_secret = Some(key.secret());
                Ok(Step::Continue)
            }
            msg_type::READY_FOR_QUERY if self.state == FlowState::AwaitingReady => {
                let ready = ReadyForQuery::parse(payload)?;
                self.transaction_status = ready.transaction_status()?;
                self.state = FlowState::Complete;
                Ok(Step::Done)
            }
            _ => Err(Error::Protocol(format!(
                "unexpected message during startup: '{}'",
                tag as char
            ))),
        }
    }

    fn handle_authentication(&mut self, payload: &[u8]) -> Result<Step> {
        let message = AuthenticationMessage::parse(payload)?;

        match (self.state, message) {
            (
                FlowState::AwaitingAuthRequest | FlowState::AwaitingAuthOk,
                AuthenticationMessage::Ok,
            ) => {
                self.state = FlowState::AwaitingReady;
                Ok(Step::Continue)
            }
            (FlowState::AwaitingAuthRequest, AuthenticationMessage::CleartextPassword) => {
                let password = match &self.config.credential {
                    Credential::CleartextPassword(password) => password.clone(),
                    other => {
                        return Err(Error::Authentication(format!(
                            "server requested a cleartext password but the configured credential is {}",
                            other.kind()
                        )));
                    }
                };
                self.write_buffer.clear();
                write_password(&mut self.write_buffer, &password);
                self.state = FlowState::AwaitingAuthOk;
                Ok(Step::Reply)
            }
            (FlowState::AwaitingAuthRequest, AuthenticationMessage::Md5Password { salt }) => {
                let password = match &self.config.credential {
                    Credential::Md5Password(password) => password,
                    other => {
                        return Err(Error::Authentication(format!(
                            "server requested an MD5 password but the configured credential is {}",
                            other.kind()
                        )));
                    }
                };
                let hashed = md5_password(&self.config.user, password, &salt);
                self.write_buffer.clear();
                write_password(&mut self.write_buffer, &hashed);
                self.state = FlowState::AwaitingAuthOk;
                Ok(Step::Reply)
            }
            (FlowState::AwaitingAuthRequest, AuthenticationMessage::Sasl { mechanisms }) => {
                let password = match &self.config.credential {
                    Credential::ScramSha256(password) => password.clone(),
                    other => {
                        return Err(Error::Authentication(format!(
                            "server requested SASL authentication but the configured credential is {}",
                            other.kind()
                        )));
                    }
                };

                let mechanism = select_mechanism(
                    &mechanisms,
                    self.config.channel_binding,
                    self.cbind_data,
                )?;
                if mechanism == Mechanism::ScramSha256
                    && self.config.channel_binding == ChannelBindingPolicy::Preferred
                {
                    self.logger.log(&LogRecord::new(
                        LogLevel::Warning,
                        "channel binding unavailable; continuing with SCRAM-SHA-256",
                    ));
                }

                let cbind_data = match mechanism {
                    Mechanism::ScramSha256Plus => self.cbind_data,
                    Mechanism::ScramSha256 => None,
                };
                let scram = ScramAuthenticator::new("", &password, mechanism, cbind_data)?;

                self.write_buffer.clear();
                write_sasl_initial_response(
                    &mut self.write_buffer,
                    mechanism.as_str(),
                    scram.client_first_message().as_bytes(),
                );
                self.scram = Some(scram);
                self.state = FlowState::AwaitingSaslContinue;
                Ok(Step::Reply)
            }
            (FlowState::AwaitingSaslContinue, AuthenticationMessage::SaslContinue { data }) => {
                let scram = self
                    .scram
                    .as_mut()
                    .ok_or_else(|| Error::Protocol("SASLContinue without an exchange".into()))?;
                let client_final = scram.handle_server_first(data)?;

                self.write_buffer.clear();
                write_sasl_response(&mut self.write_buffer, client_final.as_bytes());
                self.state = FlowState::AwaitingSaslFinal;
                Ok(Step::Reply)
            }
            (FlowState::AwaitingSaslFinal, AuthenticationMessage::SaslFinal { data }) => {
                let scram = self
                    .scram
                    .as_ref()
                    .ok_or_else(|| Error::Protocol("SASLFinal without an exchange".into()))?;
                scram.handle_server_final(data)?;
                self.state = FlowState::AwaitingAuthOk;
                Ok(Step::Continue)
            }
            (FlowState::AwaitingAuthRequest, AuthenticationMessage::Unsupported { name }) => {
                Err(Error::Authentication(format!(
                    "unsupported authentication method: {}",
                    name
                )))
            }
            (state, message) => Err(Error::Protocol(format!(
                "unexpected authentication message {:?} in state {:?}",
                message, state
            ))),
        }
    }
}

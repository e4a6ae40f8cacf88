//! Per-connection authentication and request routing.

use castline_core::{Challenge, Command, MessageToClient, Request, RequestId, ResultCode};

/// State for one connection attempt.
///
/// A new session (and so a new challenge) is created for every connection.
/// `identified` only moves from false to true.
#[derive(Debug)]
pub struct Session {
    challenge: Challenge,
    identified: bool,
}

/// What the engine has to do with a request.
#[derive(Debug, PartialEq)]
pub enum Dispatch {
    /// Send this message right away.
    Reply(MessageToClient),
    /// Ask the provider for status, then answer `id`.
    GetStatus(RequestId),
    /// Hand the command to the provider, then answer `id` if it was handled.
    Execute(RequestId, Command),
    /// Drop the request without a response.
    Ignore,
}

impl Session {
    pub fn new() -> Self {
        Self::with_challenge(Challenge::generate())
    }

    pub fn with_challenge(challenge: Challenge) -> Self {
        Self {
            challenge,
            identified: false,
        }
    }

    pub fn challenge(&self) -> &Challenge {
        &self.challenge
    }

    pub fn is_identified(&self) -> bool {
        self.identified
    }

    /// The `hello` event announcing this session's challenge.
    pub fn hello(&self) -> MessageToClient {
        MessageToClient::hello(self.challenge.clone())
    }

    /// Route one request.
    ///
    /// A failed `identify` keeps the challenge; the controller may retry on
    /// the same connection.
    pub fn handle(&mut self, id: RequestId, request: Request, password: &str) -> Dispatch {
        if !self.identified {
            return match request {
                Request::Identify { authentication } => {
                    if self.challenge.verify(password, &authentication) {
                        self.identified = true;
                        Dispatch::Reply(MessageToClient::result(id, ResultCode::Ok))
                    } else {
                        Dispatch::Reply(MessageToClient::result(id, ResultCode::WrongPassword))
                    }
                }
                _ => Dispatch::Ignore,
            };
        }

        match request {
            Request::Identify { .. } => Dispatch::Ignore,
            Request::GetStatus {} => Dispatch::GetStatus(id),
            other => match other.into_command() {
                Some(command) => Dispatch::Execute(id, command),
                None => Dispatch::Ignore,
            },
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use castline_core::hash_password;

    const PASSWORD: &str = "correct";

    fn identify(session: &Session, password: &str) -> Request {
        let challenge = session.challenge();
        Request::Identify {
            authentication: hash_password(&challenge.challenge, &challenge.salt, password),
        }
    }

    #[test]
    fn wrong_then_correct_password_on_same_challenge() {
        let mut session = Session::new();
        let before = session.challenge().clone();

        let wrong = identify(&session, "wrong");
        assert_eq!(
            session.handle(1, wrong, PASSWORD),
            Dispatch::Reply(MessageToClient::result(1, ResultCode::WrongPassword))
        );
        assert!(!session.is_identified());
        assert_eq!(session.challenge(), &before);

        let right = identify(&session, PASSWORD);
        assert_eq!(
            session.handle(2, right, PASSWORD),
            Dispatch::Reply(MessageToClient::result(2, ResultCode::Ok))
        );
        assert!(session.is_identified());
    }

    #[test]
    fn requests_before_identify_are_dropped() {
        let mut session = Session::new();
        assert_eq!(session.handle(1, Request::GetStatus {}, PASSWORD), Dispatch::Ignore);
        assert_eq!(
            session.handle(2, Request::SetRecord { on: true }, PASSWORD),
            Dispatch::Ignore
        );
        assert!(!session.is_identified());
    }

    #[test]
    fn identified_session_routes_requests() {
        let mut session = Session::new();
        let right = identify(&session, PASSWORD);
        session.handle(1, right, PASSWORD);

        assert_eq!(
            session.handle(5, Request::GetStatus {}, PASSWORD),
            Dispatch::GetStatus(5)
        );
        assert_eq!(
            session.handle(6, Request::SetScene { id: "main".into() }, PASSWORD),
            Dispatch::Execute(6, Command::SetScene("main".into()))
        );
    }

    #[test]
    fn identify_after_identified_is_ignored() {
        let mut session = Session::new();
        let right = identify(&session, PASSWORD);
        session.handle(1, right, PASSWORD);

        let wrong = identify(&session, "wrong");
        assert_eq!(session.handle(2, wrong, PASSWORD), Dispatch::Ignore);
        assert!(session.is_identified());
    }

    #[test]
    fn hello_carries_the_session_challenge() {
        let session = Session::with_challenge(Challenge {
            challenge: "c".into(),
            salt: "s".into(),
        });
        let MessageToClient::Event(castline_core::Event::Hello { authentication, .. }) =
            session.hello()
        else {
            panic!("expected hello");
        };
        assert_eq!(authentication, *session.challenge());
    }
}

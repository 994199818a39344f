use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use hysky_clock::UnixMillis;
use reqwest::Url;

use crate::{
    gateway::{Transport, TransportError},
    keys::{Identity, KeyMaterial, RsaPrivateKey, Signer},
    nonce::{NonceSigner, SigningAlgorithm, SigningError},
    notify::{Advisory, Notifier},
    request::{build_request, AuthRequest, ClientMetadata},
    schedule::{ScheduledTask, Scheduler},
};

pub const RSA_PRIVATE_KEY_PKCS8: &[u8] = include_bytes!("../data/rsa/test-key.pk8");
pub const RSA_PRIVATE_KEY_DER: &[u8] = include_bytes!("../data/rsa/test-key.rsa.der");
pub const RSA_PUBLIC_KEY: &[u8] = include_bytes!("../data/rsa/test-key.pub.der");
pub const RSA_PUBLIC_KEY_SPKI: &[u8] = include_bytes!("../data/rsa/test-key.spki.der");
pub const OTHER_RSA_PUBLIC_KEY: &[u8] = include_bytes!("../data/rsa/other-key.pub.der");

pub const IDENTITY: Identity = Identity::from_u128(0x5f3a_b1c2_7d4e_4f60_9a8b_1c2d_3e4f_5a6b);
pub const KEY_SIGNATURE: &[u8] = b"certified-by-the-identity-provider";
pub const KEY_EXPIRES_AT: UnixMillis = UnixMillis(1_700_000_000_000);

pub const TOKEN_BODY: &str = r#"{"token":"abc","issuedAt":1000,"expiresAt":301000}"#;

pub fn private_key() -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs8(RSA_PRIVATE_KEY_PKCS8).unwrap()
}

pub fn key_material() -> KeyMaterial {
    KeyMaterial::new(
        RSA_PUBLIC_KEY_SPKI,
        KEY_SIGNATURE,
        KEY_EXPIRES_AT,
        private_key(),
    )
}

pub fn client_metadata() -> ClientMetadata {
    ClientMetadata::new("skyblocker", "1.21.1", "1.22.0")
}

pub fn auth_request() -> AuthRequest {
    let material = key_material();
    let nonce = NonceSigner::default()
        .sign(material.private_key())
        .unwrap();
    build_request(Some(IDENTITY), &material, nonce, &client_metadata()).unwrap()
}

#[derive(Debug)]
pub struct FailingSigner {
    compatible: bool,
}

impl FailingSigner {
    pub fn incompatible() -> Self {
        Self { compatible: false }
    }

    pub fn broken() -> Self {
        Self { compatible: true }
    }
}

impl Signer for FailingSigner {
    fn can_sign(&self, _alg: SigningAlgorithm) -> bool {
        self.compatible
    }

    fn sign(&self, _alg: SigningAlgorithm, _data: &[u8]) -> Result<Vec<u8>, SigningError> {
        Err(SigningError::Provider {
            reason: "hardware token unplugged".into(),
        })
    }
}

#[derive(Clone, Debug)]
enum Scripted {
    Body(String),
    Status(u16, String),
}

/// A transport that replays scripted responses in order, repeating the last
/// one once the script runs out
#[derive(Clone, Debug, Default)]
pub struct StubTransport {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_with(self, body: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Body(body.to_owned()));
        self
    }

    pub fn fail_with_status(self, status: u16, body: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Status(status, body.to_owned()));
        self
    }

    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn post_json(&self, _url: &Url, body: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        self.requests.lock().unwrap().push(body);

        let next = {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        };

        match next {
            Some(Scripted::Body(body)) => Ok(body.into_bytes()),
            Some(Scripted::Status(status, body)) => {
                Err(TransportError::ErrorWithBody { status, body })
            }
            None => Err(TransportError::RequestSend("no response scripted".into())),
        }
    }
}

/// A scheduler that holds on to tasks until a test fires them
#[derive(Clone, Default)]
pub struct RecordingScheduler {
    delays: Arc<Mutex<Vec<Duration>>>,
    pending: Arc<Mutex<VecDeque<ScheduledTask>>>,
}

impl std::fmt::Debug for RecordingScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("RecordingScheduler")
            .field("delays", &self.delays())
            .field("pending", &self.pending())
            .finish()
    }
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delay requested so far, in order
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Runs the oldest pending task to completion
    pub async fn fire_next(&self) {
        let task = self
            .pending
            .lock()
            .unwrap()
            .pop_front()
            .expect("a task to be scheduled");
        task.await;
    }
}

impl Scheduler for RecordingScheduler {
    fn schedule_once(&self, delay: Duration, task: ScheduledTask) {
        self.delays.lock().unwrap().push(delay);
        self.pending.lock().unwrap().push_back(task);
    }
}

#[derive(Clone, Debug, Default)]
pub struct CollectingNotifier {
    advisories: Arc<Mutex<Vec<Advisory>>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advisories(&self) -> Vec<Advisory> {
        self.advisories.lock().unwrap().clone()
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, advisory: Advisory) {
        self.advisories.lock().unwrap().push(advisory);
    }
}

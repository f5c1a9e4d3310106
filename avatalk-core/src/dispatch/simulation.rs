//! Offline dispatcher: answers from a fixed template set after a delay.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::{Reply, ReplySource, ResponseDispatcher};
use crate::session::SessionIdentity;

/// Number of canned replies.
pub const TEMPLATE_COUNT: usize = 4;

/// Render template `index` for `text`. Only the first template quotes the input.
pub fn template(index: usize, text: &str) -> String {
    match index % TEMPLATE_COUNT {
        0 => format!("Kamu berkata: \"{text}\". Mode simulasi aktif."),
        1 => "Tampilan video sudah berfungsi! Mulut saya bergerak, kan?".into(),
        2 => "Ini adalah respon acak. Sekarang giliranmu bicara lagi.".into(),
        _ => "Aku tidak bisa memproses pertanyaan kompleks di mode ini.".into(),
    }
}

/// All replies the simulator can produce for `text`.
pub fn templates(text: &str) -> Vec<String> {
    (0..TEMPLATE_COUNT).map(|i| template(i, text)).collect()
}

pub struct SimulationDispatcher {
    delay: Duration,
    rng: Mutex<StdRng>,
}

impl SimulationDispatcher {
    /// Uniformly random template selection.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible selection for tests and demos.
    pub fn with_seed(delay: Duration, seed: u64) -> Self {
        Self {
            delay,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl std::fmt::Debug for SimulationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationDispatcher")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ResponseDispatcher for SimulationDispatcher {
    async fn respond(&self, text: &str, _identity: &SessionIdentity) -> Reply {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let index = self.rng.lock().gen_range(0..TEMPLATE_COUNT);
        Reply::new(template(index, text), ReplySource::Simulated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_template_quotes_the_input() {
        assert_eq!(
            template(0, "Apa kabar?"),
            "Kamu berkata: \"Apa kabar?\". Mode simulasi aktif."
        );
        assert_eq!(templates("x").len(), TEMPLATE_COUNT);
    }

    #[tokio::test]
    async fn replies_come_from_the_template_set() {
        let dispatcher = SimulationDispatcher::with_seed(Duration::ZERO, 7);
        let identity = SessionIdentity::local(0);
        let allowed = templates("Siapa kamu?");
        for _ in 0..32 {
            let reply = dispatcher.respond("Siapa kamu?", &identity).await;
            assert_eq!(reply.source, ReplySource::Simulated);
            assert!(allowed.contains(&reply.text), "unexpected reply {}", reply.text);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reply_waits_for_the_configured_delay() {
        let dispatcher = SimulationDispatcher::with_seed(Duration::from_millis(1_000), 1);
        let identity = SessionIdentity::local(0);
        let started = tokio::time::Instant::now();
        dispatcher.respond("halo", &identity).await;
        assert!(started.elapsed() >= Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn seeded_dispatchers_agree() {
        let a = SimulationDispatcher::with_seed(Duration::ZERO, 99);
        let b = SimulationDispatcher::with_seed(Duration::ZERO, 99);
        let identity = SessionIdentity::local(0);
        for _ in 0..8 {
            assert_eq!(
                a.respond("halo", &identity).await,
                b.respond("halo", &identity).await
            );
        }
    }
}

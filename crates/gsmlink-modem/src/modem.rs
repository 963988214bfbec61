//! The modem engine: lifecycle, SMS queues, status and events.
//!
//! [`Modem`] is the single context object owning the transport, the
//! session state, both SIM index queues and the indicator. Feature
//! operations live in [`operations`](crate::operations) and the per-tick
//! scheduler in [`dispatch`](crate::dispatch); both are further `impl Modem`
//! blocks.

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use gsmlink_core::{
    BoundedQueue, Deadline, Error, ModemEvent, OutputPin, Result, SharedClock, SignalLevel, Sms,
    SmsQueue, Transport,
};

use crate::commands;
use crate::config::{ModemConfig, RegistrationPolicy};
use crate::engine::CommandEngine;
use crate::indicator::NetworkIndicator;
use crate::session::Session;

/// Capacity of each SIM index queue.
pub const SMS_QUEUE_CAPACITY: usize = 10;

/// Queue of SIM storage indices.
pub(crate) type IndexQueue = BoundedQueue<u16, SMS_QUEUE_CAPACITY>;

/// A GSM modem driven over AT commands.
///
/// Construct with [`ModemBuilder`](crate::builder::ModemBuilder), call
/// [`initialize`](Modem::initialize) once, then call
/// [`dispatch`](Modem::dispatch) repeatedly from the host loop.
pub struct Modem {
    pub(crate) engine: CommandEngine,
    pub(crate) config: ModemConfig,
    pub(crate) session: Session,
    pub(crate) inbound: IndexQueue,
    pub(crate) outbound: IndexQueue,
    pub(crate) indicator: NetworkIndicator,
    power_pin: Box<dyn OutputPin>,
    pub(crate) keepalive: Deadline,
    pub(crate) registration_delay: Deadline,
    pub(crate) resend: Deadline,
    event_tx: broadcast::Sender<ModemEvent>,
}

impl Modem {
    pub(crate) fn new(
        transport: Box<dyn Transport>,
        indicator_pin: Box<dyn OutputPin>,
        power_pin: Box<dyn OutputPin>,
        config: ModemConfig,
        clock: SharedClock,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        let indicator = NetworkIndicator::new(
            indicator_pin,
            clock.clone(),
            config.indicator_interval,
            config.indicator_on,
            config.indicator_off,
        );
        let settle = match config.registration {
            RegistrationPolicy::Settle(delay) => delay,
            RegistrationPolicy::Immediate => Duration::ZERO,
        };

        Modem {
            keepalive: Deadline::armed(clock.clone(), config.keepalive_interval),
            registration_delay: Deadline::armed(clock.clone(), settle),
            resend: Deadline::armed(clock.clone(), config.sms_retry_interval),
            engine: CommandEngine::new(transport, clock, config.line_capacity),
            config,
            session: Session::default(),
            inbound: IndexQueue::new(),
            outbound: IndexQueue::new(),
            indicator,
            power_pin,
            event_tx,
        }
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    /// Power the modem on and run the handshake.
    ///
    /// A failed handshake is returned to the caller and not retried here.
    pub async fn initialize(&mut self) -> Result<()> {
        self.keepalive.reset();
        self.indicator.restart();
        self.registration_delay.reset();
        self.resend.reset();

        self.power_on().await?;
        self.inner_setup().await
    }

    /// Re-run the handshake without pulsing the power key, for example
    /// after the engine went fatal.
    pub async fn reinitialize(&mut self) -> Result<()> {
        self.inner_setup().await
    }

    /// Reset the session and run the handshake.
    ///
    /// Baud negotiation: the modem is addressed at the initial rate and
    /// told to switch, then the local port follows.
    pub(crate) async fn inner_setup(&mut self) -> Result<()> {
        self.session.reset();
        self.inbound.clear();
        self.outbound.clear();

        self.engine.discard_input(self.config.handshake_flush).await?;

        self.engine
            .set_baud_rate(self.config.initial_baud_rate)
            .await?;
        self.engine
            .send_command(&commands::cmd_set_baud_rate(self.config.baud_rate))
            .await?;
        tokio::time::sleep(self.config.baud_switch_delay).await;
        self.engine.set_baud_rate(self.config.baud_rate).await?;
        // Drops the echo of the baud-rate command.
        self.engine
            .discard_input(self.config.handshake_settle)
            .await?;

        self.engine
            .send_raw(commands::INIT_SEQUENCE.as_bytes())
            .await?;
        self.engine
            .discard_input(self.config.handshake_settle)
            .await?;
        self.engine.send_raw(b"\r").await?;

        match self
            .engine
            .wait_answer(self.config.timeouts.handshake, true)
            .await?
            .into_result()
        {
            Ok(()) => {
                info!(baud_rate = self.config.baud_rate, "modem initialized");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "modem initialization failed");
                Err(e)
            }
        }
    }

    /// Pulse the power key.
    pub async fn power_on(&mut self) -> Result<()> {
        debug!(pulse = ?self.config.power_pulse, "powering modem");
        self.power_pin.set_high()?;
        tokio::time::sleep(self.config.power_pulse).await;
        self.power_pin.set_low()?;
        info!("modem power is on");
        Ok(())
    }

    /// Ask the modem to power down and give it time to do so.
    pub async fn power_off(&mut self) -> Result<()> {
        info!("powering modem off");
        self.engine.send_command(&commands::cmd_power_off()).await?;
        self.engine
            .discard_input(self.config.timeouts.power_off)
            .await
    }

    /// Close the transport.
    pub async fn close(&mut self) -> Result<()> {
        self.engine.close().await
    }

    // ---------------------------------------------------------------
    // SMS queues
    // ---------------------------------------------------------------

    /// Store a message in the SIM and queue it for sending.
    ///
    /// Returns the storage index. The message is sent by a later
    /// [`dispatch`](Modem::dispatch) once the modem is registered.
    pub async fn send_sms(&mut self, number: &str, body: &str) -> Result<u16> {
        let index = self.write_sms(number, body).await?;
        if self.outbound.enqueue(index).is_err() {
            warn!(index, "outbound queue full, discarding stored message");
            if let Err(e) = self.delete_sms_at_index(index).await {
                debug!(index, error = %e, "could not delete unqueued message");
            }
            return Err(Error::QueueFull(SmsQueue::Outbound.to_string()));
        }
        info!(index, queued = self.outbound.count(), "SMS queued for sending");
        self.emit(ModemEvent::SmsStored { index });
        Ok(index)
    }

    /// Number of indices waiting in `queue`.
    pub fn sms_count(&self, queue: SmsQueue) -> usize {
        self.queue(queue).count()
    }

    /// Remove the head of `queue`, read the message, then delete it from
    /// the store.
    ///
    /// The index leaves the queue even if reading or deleting fails.
    pub async fn sms_dequeue(&mut self, queue: SmsQueue) -> Result<Sms> {
        let index = self.take_head(queue)?;
        let sms = self
            .read_sms_at_index(index)
            .await?
            .ok_or_else(|| Error::Protocol(format!("no message stored at index {index}")))?;
        self.delete_sms_at_index(index).await?;
        debug!(index, %queue, "SMS dequeued");
        Ok(sms)
    }

    /// Remove the head of `queue` and delete the message without reading
    /// it.
    pub async fn sms_discard(&mut self, queue: SmsQueue) -> Result<()> {
        let index = self.take_head(queue)?;
        self.delete_sms_at_index(index).await?;
        debug!(index, %queue, "SMS discarded");
        Ok(())
    }

    fn take_head(&mut self, queue: SmsQueue) -> Result<u16> {
        self.queue_mut(queue)
            .dequeue()
            .ok_or_else(|| Error::QueueEmpty(queue.to_string()))
    }

    fn queue(&self, queue: SmsQueue) -> &IndexQueue {
        match queue {
            SmsQueue::Inbound => &self.inbound,
            SmsQueue::Outbound => &self.outbound,
        }
    }

    fn queue_mut(&mut self, queue: SmsQueue) -> &mut IndexQueue {
        match queue {
            SmsQueue::Inbound => &mut self.inbound,
            SmsQueue::Outbound => &mut self.outbound,
        }
    }

    // ---------------------------------------------------------------
    // Status
    // ---------------------------------------------------------------

    /// Keepalive failures exceeded the threshold and the modem was powered
    /// off. Cleared by a later keepalive success or a re-handshake.
    pub fn is_fatal(&self) -> bool {
        self.session.fatal
    }

    pub fn is_phonebook_ready(&self) -> bool {
        self.session.phonebook_ready
    }

    /// Registered on the network (after any settle delay).
    pub fn is_registered(&self) -> bool {
        self.session.registered
    }

    /// At least one received message is waiting.
    pub fn is_sms_available(&self) -> bool {
        !self.inbound.is_empty()
    }

    pub fn signal_level(&self) -> SignalLevel {
        self.session.signal
    }

    /// Unsolicited lines captured during command waits and not yet
    /// processed by [`dispatch`](Modem::dispatch).
    pub fn pending_urcs(&self) -> usize {
        self.engine.pending_urcs()
    }

    /// The transport is still open.
    pub fn is_connected(&self) -> bool {
        self.engine.is_connected()
    }

    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    // ---------------------------------------------------------------
    // Events
    // ---------------------------------------------------------------

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<ModemEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn emit(&self, event: ModemEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }
}

//! Device manager, which keeps the controller configured and tracks the power contract.
//!
//! The alert interrupt only wakes the manager through an [`AlertSignal`]. All register traffic,
//! including the blocking NVM sequences, runs in the task that drives the manager.
//!
//! ```ignore
//! static ALERT: AlertSignal = AlertSignal::new();
//!
//! // In the alert interrupt handler.
//! ALERT.signal(());
//!
//! // In the worker task.
//! let mut manager = Manager::new(Stusb4500::new(I2cBus::new(i2c), delay), SinkConfig::default(), &ALERT);
//! manager.init()?;
//! manager.run().await;
//! ```
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embedded_hal::delay::DelayNs;
use stusb4500_traits::RegisterBus;

use crate::{ArgumentError, Error};
use crate::config::SinkConfig;
use crate::device::Stusb4500;
use crate::negotiation::{Outcome, PowerContract};
use crate::nvm::{NvmDiff, NvmImage, diff};
use crate::registers::{AlertStatus, DEVICE_ID_VALUE, PolicyEngineState, StatusSnapshot};

/// Single-slot wake channel from the alert interrupt to the manager.
pub type AlertSignal = Signal<CriticalSectionRawMutex, ()>;

/// Number of device identification attempts.
pub const DETECT_ATTEMPTS: u8 = 10;

/// Pause between device identification attempts.
pub const DETECT_INTERVAL_MS: u32 = 50;

/// Time for the controller to settle after programming the NVM.
pub const NVM_SETTLE_MS: u32 = 1000;

/// Result of applying the configuration to the NVM.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NvmUpdate {
    /// The NVM already held the configuration.
    UpToDate,
    /// The NVM was programmed and verified.
    Written,
}

/// Owns a device and its desired configuration.
pub struct Manager<'a, B, D> {
    device: Stusb4500<B, D>,
    config: SinkConfig,
    alert: &'a AlertSignal,
    ready: bool,
    contract: PowerContract,
}

impl<'a, B: RegisterBus, D: DelayNs> Manager<'a, B, D> {
    /// Create a manager. The device is not touched until [`Manager::init`].
    pub fn new(device: Stusb4500<B, D>, config: SinkConfig, alert: &'a AlertSignal) -> Self {
        Self {
            device,
            config,
            alert,
            ready: false,
            contract: PowerContract::default(),
        }
    }

    /// Release the device.
    pub fn release(self) -> Stusb4500<B, D> {
        self.device
    }

    /// The managed device.
    pub fn device(&mut self) -> &mut Stusb4500<B, D> {
        &mut self.device
    }

    /// The desired configuration.
    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    /// Replace the desired configuration. It takes effect with the next [`Manager::apply_nvm_config`].
    pub fn set_config(&mut self, config: SinkConfig) {
        self.config = config;
    }

    /// The contract in effect, as of the last alert.
    pub fn contract(&self) -> PowerContract {
        self.contract
    }

    /// Whether the device was detected.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    fn ensure_ready(&self) -> Result<(), Error<B::Error>> {
        if self.ready { Ok(()) } else { Err(Error::NotReady) }
    }

    /// Poll the device identification until the controller responds.
    pub fn detect(&mut self) -> Result<(), Error<B::Error>> {
        for attempt in 1..=DETECT_ATTEMPTS {
            if attempt > 1 {
                self.device.delay_ms(DETECT_INTERVAL_MS);
            }

            match self.device.device_id() {
                Ok(DEVICE_ID_VALUE) => {
                    info!("STUSB4500 detected");
                    self.ready = true;
                    return Ok(());
                }
                Ok(id) => debug!("Unexpected device ID {:#x} (attempt {})", id, attempt),
                Err(_) => debug!("No response from device (attempt {})", attempt),
            }
        }

        error!("STUSB4500 not detected");
        self.ready = false;
        Err(Error::Timeout)
    }

    /// Detect the device, set up alerts and bring the NVM up to date.
    pub fn init(&mut self) -> Result<NvmUpdate, Error<B::Error>> {
        self.config.validate()?;
        self.detect()?;

        self.device.clear_alerts()?;
        self.device.set_alert_mask(self.config.alert_mask)?;

        self.apply_nvm_config()
    }

    /// Differences between the NVM and the desired configuration.
    pub fn nvm_diff(&mut self) -> Result<NvmDiff, Error<B::Error>> {
        self.ensure_ready()?;

        let current = self.device.read_nvm()?;
        Ok(diff(&current, &NvmImage::encode(&self.config)))
    }

    /// Program the desired configuration into the NVM, unless it is already there.
    ///
    /// After programming, the controller renegotiates with a soft reset.
    pub fn apply_nvm_config(&mut self) -> Result<NvmUpdate, Error<B::Error>> {
        self.ensure_ready()?;
        self.config.validate()?;

        if self.config.power.has_lossy_current() {
            warn!("Some PDO currents cannot be stored, the flex current applies to them");
        }

        let desired = NvmImage::encode(&self.config);
        let current = self.device.read_nvm()?;
        let changes = diff(&current, &desired);

        if changes.is_empty() {
            info!("NVM is up to date");
            return Ok(NvmUpdate::UpToDate);
        }

        info!("NVM differs in {} byte(s), programming", changes.len());
        for change in &changes {
            debug!(
                "NVM byte {}: {:#x} -> {:#x}",
                change.offset, change.current, change.desired
            );
        }

        self.device.write_nvm(&desired)?;
        self.device.delay_ms(NVM_SETTLE_MS);
        self.device.soft_reset()?;
        self.contract = PowerContract::default();

        Ok(NvmUpdate::Written)
    }

    /// Advertise the desired configuration's PDOs up to a 1-based `index` at runtime and renegotiate.
    ///
    /// PDO `index` becomes the highest priority PDO. The NVM is not touched.
    pub fn reconfigure(&mut self, index: u8) -> Result<(), Error<B::Error>> {
        self.ensure_ready()?;

        let power = self.config.power;
        if index == 0 || index > power.pdo_number {
            return Err(ArgumentError::UndefinedPdo.into());
        }

        for position in 1..=index {
            let pdo = power
                .pdo(position)
                .ok_or(ArgumentError::PdoIndex)?;
            self.device.set_sink_pdo(position, &pdo)?;
        }
        self.device.set_pdo_count(index)?;
        self.device.soft_reset()
    }

    /// Read the status registers and react to pending alerts.
    ///
    /// Returns the alerts that were handled.
    pub fn handle_alert(&mut self) -> Result<AlertStatus, Error<B::Error>> {
        self.ensure_ready()?;

        let status = self.device.status()?;
        let alerts = status.pending_alerts();
        trace!("Pending alerts: {:?}", alerts);

        if alerts.port_status() {
            self.handle_port_status(&status);
        }

        if alerts.typec_monitoring() {
            let monitoring = status.typec_monitoring_0;
            if monitoring.vbus_high_status() {
                warn!("VBUS above the monitoring window");
            }
            if monitoring.vbus_low_status() {
                warn!("VBUS below the monitoring window");
            }
            debug!(
                "VBUS ready: {}, valid: {}",
                status.typec_monitoring_1.vbus_ready(),
                status.typec_monitoring_1.vbus_valid_sink()
            );
        }

        if alerts.cc_hw_fault() {
            let fault = status.cc_hw_fault_1;
            if fault.vpu_ovp_fault() {
                error!("Over-voltage on the CC pins");
            }
            if fault.vbus_discharge_fault() {
                error!("VBUS discharge fault");
            }
        }

        if alerts.pd_typec() {
            debug!("PD/Type-C handshake: {:?}", status.pd_typec_status.hand_check());
        }

        if alerts.prt_status() {
            if status.prt_status.hw_reset_received() {
                warn!("Hard reset received");
                self.contract = PowerContract::default();
            }

            if status.prt_status.msg_received() {
                self.update_contract()?;
            }
        }

        Ok(alerts)
    }

    fn handle_port_status(&mut self, status: &StatusSnapshot) {
        if !status.port_status_0.attach_transition() {
            return;
        }

        if status.port_status_1.attached() {
            info!("Attached: {:?}", status.port_status_1.attached_device());
        } else {
            info!("Detached");
            self.contract = PowerContract::default();
        }
    }

    /// The RDO status only describes the received capabilities once the policy engine is ready.
    fn update_contract(&mut self) -> Result<(), Error<B::Error>> {
        let state = self.device.policy_engine_state()?;
        if state != PolicyEngineState::SinkReady {
            debug!("Negotiation in progress ({:?})", state);
            return Ok(());
        }

        let negotiation = self.device.negotiate()?;
        match negotiation.outcome {
            Outcome::Established => self.contract = negotiation.contract,
            Outcome::Pending => {}
            Outcome::Failed | Outcome::OutOfRange { .. } => self.contract = PowerContract::default(),
        }

        Ok(())
    }

    /// Wait for the next alert and handle it.
    pub async fn wait_and_handle(&mut self) -> Result<AlertStatus, Error<B::Error>> {
        self.alert.wait().await;
        self.handle_alert()
    }

    /// Handle alerts forever. Call [`Manager::init`] first.
    pub async fn run(&mut self) -> ! {
        loop {
            if self.wait_and_handle().await.is_err() {
                error!("Failed to handle alert");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Pdo;
    use crate::dummy::{DummyBus, DummyDelay, DummyError};
    use crate::nvm::DEFAULT_IMAGE;
    use crate::registers::{
        ALERT_STATUS_1, DEVICE_ID, DPM_PDO_NUMB, DPM_SNK_PDO1, FTP_CUST_PASSWORD, PD_COMMAND_CTRL, PE_FSM,
        PORT_STATUS_0, PORT_STATUS_1, PRT_STATUS, RDO_STATUS,
    };

    fn manager(bus: DummyBus, alert: &AlertSignal) -> Manager<'_, DummyBus, DummyDelay> {
        Manager::new(Stusb4500::new(bus, DummyDelay::default()), SinkConfig::default(), alert)
    }

    fn custom_config() -> SinkConfig {
        let mut config = SinkConfig::default();
        config.power.pdos[1].voltage_mv = 9000;
        config.power.pdos[1].current_ma = 3000;
        config.power.usb_comm_capable = true;
        config
    }

    fn soft_resets(manager: &Manager<'_, DummyBus, DummyDelay>) -> usize {
        manager.device.bus.count_writes(PD_COMMAND_CTRL, &[0x26])
    }

    #[test]
    fn test_not_ready_before_detection() {
        let alert = AlertSignal::new();
        let mut manager = manager(DummyBus::new(), &alert);

        assert_eq!(manager.handle_alert(), Err(Error::NotReady));
        assert_eq!(manager.apply_nvm_config(), Err(Error::NotReady));
        assert_eq!(manager.reconfigure(1), Err(Error::NotReady));
        assert!(manager.device.bus.trace.is_empty());
    }

    #[test]
    fn test_detection_times_out() {
        let mut bus = DummyBus::new();
        bus.registers[DEVICE_ID as usize] = 0x21;
        let alert = AlertSignal::new();
        let mut manager = manager(bus, &alert);

        assert_eq!(manager.detect(), Err(Error::Timeout));
        assert!(!manager.is_ready());
        assert_eq!(manager.device.bus.count_reads(DEVICE_ID), DETECT_ATTEMPTS as usize);
        assert_eq!(
            manager.device.delay.elapsed_us(),
            u64::from(DETECT_ATTEMPTS - 1) * u64::from(DETECT_INTERVAL_MS) * 1000
        );
    }

    #[test]
    fn test_init_skips_up_to_date_nvm() {
        let alert = AlertSignal::new();
        let mut manager = manager(DummyBus::new(), &alert);

        assert_eq!(manager.init(), Ok(NvmUpdate::UpToDate));
        assert!(manager.is_ready());
        assert_eq!(manager.device.bus.nvm_erase_count, 0);
        assert_eq!(manager.device.bus.count_writes(FTP_CUST_PASSWORD, &[0x47]), 1);
        assert_eq!(soft_resets(&manager), 0);
    }

    #[test]
    fn test_apply_writes_changed_config() {
        let alert = AlertSignal::new();
        let mut manager = manager(DummyBus::new(), &alert);
        manager.set_config(custom_config());

        assert_eq!(manager.init(), Ok(NvmUpdate::Written));
        assert_eq!(manager.device.bus.nvm, NvmImage::encode(&custom_config()));
        assert_eq!(manager.device.bus.nvm_erase_count, 1);
        assert_eq!(soft_resets(&manager), 1);
        assert!(manager.nvm_diff().unwrap().is_empty());

        assert_eq!(manager.apply_nvm_config(), Ok(NvmUpdate::UpToDate));
        assert_eq!(manager.device.bus.nvm_erase_count, 1);
    }

    #[test]
    fn test_apply_surfaces_verification_failure() {
        let mut bus = DummyBus::new();
        bus.stick_nvm_bit(33, 0x02);
        let alert = AlertSignal::new();
        let mut manager = manager(bus, &alert);
        let mut config = custom_config();
        config.power.pdos[1].voltage_mv = 5250;
        manager.set_config(config);

        match manager.init() {
            Err(Error::Verification(mismatch)) => {
                assert_eq!(mismatch.len(), 1);
                assert_eq!(mismatch[0].offset, 33);
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(soft_resets(&manager), 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let alert = AlertSignal::new();
        let mut manager = manager(DummyBus::new(), &alert);
        let mut config = SinkConfig::default();
        config.power.pdo_number = 4;
        manager.set_config(config);

        assert_eq!(manager.init(), Err(Error::InvalidArgument(ArgumentError::PdoCount)));
        assert!(manager.device.bus.trace.is_empty());
    }

    #[test]
    fn test_message_alert_establishes_contract() {
        let mut bus = DummyBus::new();
        bus.registers[ALERT_STATUS_1 as usize] = 0x02;
        bus.registers[PRT_STATUS as usize] = 0x04;
        bus.inject_source_capabilities(&[Pdo::fixed(5000, 3000), Pdo::fixed(9000, 3000)]);
        bus.inject_rdo((2 << 28) | (150 << 10) | 300);
        bus.registers[PE_FSM as usize] = 0x18;
        let alert = AlertSignal::new();
        let mut manager = manager(bus, &alert);
        manager.detect().unwrap();

        let alerts = manager.handle_alert().unwrap();
        assert!(alerts.prt_status());

        let contract = manager.contract();
        assert!(contract.valid);
        assert_eq!(contract.voltage_mv, 9000);
        assert_eq!(contract.current_ma, 1500);
        assert_eq!(contract.pdo_index, 2);
        assert_eq!(soft_resets(&manager), 0);
    }

    fn message_alert_bus(policy_engine_state: u8, pdos: &[Pdo], rdo: u32) -> DummyBus {
        let mut bus = DummyBus::new();
        bus.registers[ALERT_STATUS_1 as usize] = 0x02;
        bus.registers[PRT_STATUS as usize] = 0x04;
        bus.registers[PE_FSM as usize] = policy_engine_state;
        bus.inject_source_capabilities(pdos);
        bus.inject_rdo(rdo);
        bus
    }

    #[test]
    fn test_failed_negotiation_clears_contract() {
        let alert = AlertSignal::new();
        let bus = message_alert_bus(0x18, &[Pdo::fixed(5000, 3000)], 3 << 28);
        let mut manager = manager(bus, &alert);
        manager.detect().unwrap();
        manager.contract = PowerContract {
            valid: true,
            voltage_mv: 5000,
            current_ma: 3000,
            max_current_ma: 3000,
            pdo_index: 1,
        };

        manager.handle_alert().unwrap();
        assert!(!manager.contract().valid);
        assert_eq!(soft_resets(&manager), 0);
    }

    #[test]
    fn test_capabilities_before_request_do_not_reset() {
        let alert = AlertSignal::new();
        let pdos = [Pdo::fixed(5000, 3000), Pdo::fixed(9000, 3000)];
        let mut manager = manager(message_alert_bus(0x15, &pdos, 0), &alert);
        manager.detect().unwrap();

        let alerts = manager.handle_alert().unwrap();
        assert!(alerts.prt_status());
        assert!(!manager.contract().valid);
        assert_eq!(soft_resets(&manager), 0);
        assert_eq!(manager.device.bus.count_reads(RDO_STATUS), 0);
    }

    #[test]
    fn test_stale_rdo_is_ignored_during_negotiation() {
        let alert = AlertSignal::new();
        let pdos = [Pdo::fixed(5000, 3000), Pdo::fixed(20000, 2250)];
        let mut manager = manager(message_alert_bus(0x16, &pdos, (2 << 28) | (150 << 10) | 300), &alert);
        manager.detect().unwrap();

        manager.handle_alert().unwrap();
        assert!(!manager.contract().valid);
        assert_eq!(soft_resets(&manager), 0);

        // The policy engine settles on the new capabilities.
        manager.device.bus.inject_rdo((2 << 28) | (225 << 10) | 225);
        manager.device.bus.registers[PE_FSM as usize] = 0x18;
        manager.handle_alert().unwrap();
        assert_eq!(manager.contract().voltage_mv, 20000);
        assert_eq!(manager.contract().current_ma, 2250);
    }

    #[test]
    fn test_detach_clears_contract() {
        let mut bus = DummyBus::new();
        bus.registers[ALERT_STATUS_1 as usize] = 0x42;
        bus.registers[PRT_STATUS as usize] = 0x04;
        bus.inject_source_capabilities(&[Pdo::fixed(5000, 3000)]);
        bus.inject_rdo((1 << 28) | (300 << 10) | 300);
        bus.registers[PE_FSM as usize] = 0x18;
        let alert = AlertSignal::new();
        let mut manager = manager(bus, &alert);
        manager.detect().unwrap();

        manager.handle_alert().unwrap();
        assert!(manager.contract().valid);

        manager.device.bus.registers[ALERT_STATUS_1 as usize] = 0x40;
        manager.device.bus.registers[PORT_STATUS_0 as usize] = 0x01;
        manager.device.bus.registers[PORT_STATUS_1 as usize] = 0x00;
        manager.handle_alert().unwrap();
        assert!(!manager.contract().valid);
    }

    #[test]
    fn test_reconfigure_selects_pdo() {
        let alert = AlertSignal::new();
        let mut manager = manager(DummyBus::new(), &alert);
        manager.detect().unwrap();

        manager.reconfigure(2).unwrap();
        assert_eq!(manager.device.bus.registers[DPM_PDO_NUMB as usize], 2);
        assert_eq!(manager.device().sink_pdo(2), Ok(Pdo::fixed(15000, 1500)));
        assert!(
            manager
                .device
                .bus
                .writes()
                .iter()
                .all(|(register, _)| *register != DPM_SNK_PDO1 + 8)
        );
        assert_eq!(soft_resets(&manager), 1);

        assert_eq!(manager.reconfigure(0), Err(Error::InvalidArgument(ArgumentError::UndefinedPdo)));
        assert_eq!(manager.reconfigure(4), Err(Error::InvalidArgument(ArgumentError::UndefinedPdo)));
    }

    #[test]
    fn test_transport_error_propagates() {
        let mut bus = DummyBus::new();
        let alert = AlertSignal::new();
        bus.fail_reads(usize::MAX);
        let mut manager = manager(bus, &alert);
        manager.ready = true;

        assert_eq!(manager.handle_alert(), Err(Error::Transport(DummyError)));
    }

    #[tokio::test]
    async fn test_alert_signal_wakes_handler() {
        static ALERT: AlertSignal = AlertSignal::new();

        let mut bus = DummyBus::new();
        bus.registers[ALERT_STATUS_1 as usize] = 0x02;
        bus.registers[PRT_STATUS as usize] = 0x04;
        bus.inject_source_capabilities(&[Pdo::fixed(5000, 3000), Pdo::fixed(20000, 2250)]);
        bus.inject_rdo((2 << 28) | (225 << 10) | 225);
        bus.registers[PE_FSM as usize] = 0x18;
        let mut manager = Manager::new(Stusb4500::new(bus, DummyDelay::default()), SinkConfig::default(), &ALERT);
        manager.detect().unwrap();

        ALERT.signal(());
        ALERT.signal(());
        let alerts = manager.wait_and_handle().await.unwrap();

        assert!(alerts.prt_status());
        assert_eq!(manager.contract().voltage_mv, 20000);
        assert!(!ALERT.signaled());
        assert_eq!(manager.release().bus.nvm, DEFAULT_IMAGE);
    }
}

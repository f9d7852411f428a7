//! BLE link adapter.
//!
//! Implements [`Link`] — the single-peer notify channel the protocol engine
//! sends reports on — and bridges GATT callbacks into
//! [`LINK_EVENTS`](crate::rpc::channels::LINK_EVENTS).
//!
//! ## cfg gating
//!
//! - **`feature = "espidf"`**: Bluedroid BLE GATT server via `esp_idf_svc::sys`.
//! - **otherwise**: simulation backend for host-side tests.
//!
//! ## GATT Service Layout
//!
//! | Characteristic | UUID                                     | Perms  |
//! |----------------|------------------------------------------|--------|
//! | Command        | `beb5483e-36e1-4688-b7f5-ea07361b26a8`   | Write  |
//! | Data / Event   | `c8c7c599-809c-43a5-b825-1038aa349e5d`   | Notify |

use log::{info, warn};

use crate::rpc::channels::LinkEvent;
use crate::rpc::transport::{Link, LinkError};

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const DEVICE_NAME: &str = "SmartMedBox";

pub const SERVICE_UUID: u128 = 0x4fafc201_1fb5_459e_8fcc_c5c9c331914b;
pub const CHAR_COMMAND: u128 = 0xbeb5483e_36e1_4688_b7f5_ea07361b26a8;
pub const CHAR_DATA_EVENT: u128 = 0xc8c7c599_809c_43a5_b825_1038aa349e5d;

/// ATT MTU before the peer negotiates.
pub const DEFAULT_MTU: u16 = 23;

// ───────────────────────────────────────────────────────────────
// BLE state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleState {
    Idle,
    Advertising,
    Connected,
    Failed,
}

// ── ESP-IDF BLE static state (callback-safe atomics) ──────────
//
// Bluedroid callbacks are C function pointers that cannot capture Rust
// closures. These atomics bridge the callback context to the adapter;
// everything else flows through the LinkEvent channel.

#[cfg(feature = "espidf")]
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering as AtomicOrdering};

#[cfg(feature = "espidf")]
static BLE_GATTS_IF: AtomicU32 = AtomicU32::new(0);
#[cfg(feature = "espidf")]
static BLE_CONN_ID: AtomicU32 = AtomicU32::new(0);
#[cfg(feature = "espidf")]
static BLE_CONNECTED: AtomicBool = AtomicBool::new(false);
#[cfg(feature = "espidf")]
static BLE_MTU: AtomicU32 = AtomicU32::new(DEFAULT_MTU as u32);
#[cfg(feature = "espidf")]
static BLE_SVC_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(feature = "espidf")]
static BLE_COMMAND_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(feature = "espidf")]
static BLE_DATA_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(feature = "espidf")]
static BLE_CHAR_STEP: AtomicU32 = AtomicU32::new(0);

/// Queue an event for the control loop. Dropped (and logged) when full.
fn post(event: LinkEvent) {
    if crate::rpc::channels::LINK_EVENTS.try_send(event).is_err() {
        warn!("BLE: event channel full, event dropped");
    }
}

#[cfg(feature = "espidf")]
fn uuid128_to_esp(uuid: u128) -> esp_idf_svc::sys::esp_bt_uuid_t {
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 16;
    unsafe {
        t.uuid.uuid128 = uuid.to_le_bytes();
    }
    t
}

#[cfg(feature = "espidf")]
unsafe fn add_gatt_char(svc_handle: u16, uuid: u128, perm: u32, prop: u32) {
    use esp_idf_svc::sys::*;
    let mut char_uuid = uuid128_to_esp(uuid);
    unsafe {
        esp_ble_gatts_add_char(
            svc_handle,
            &mut char_uuid,
            perm as esp_gatt_perm_t,
            prop as esp_gatt_char_prop_t,
            core::ptr::null_mut(),
            core::ptr::null_mut(),
        );
    }
}

#[cfg(feature = "espidf")]
unsafe fn start_advertising() {
    use esp_idf_svc::sys::*;
    unsafe {
        let mut adv_params = esp_ble_adv_params_t {
            adv_int_min: 0x20,
            adv_int_max: 0x40,
            adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
            own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
            channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
            adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
            ..core::mem::zeroed()
        };
        esp_ble_gap_start_advertising(&mut adv_params);
    }
}

#[cfg(feature = "espidf")]
unsafe extern "C" fn ble_gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    _param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            log::info!("BLE GAP: advertising started");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
            log::info!("BLE GAP: advertising stopped");
        }
        _ => {}
    }
}

#[cfg(feature = "espidf")]
unsafe extern "C" fn ble_gatts_event_handler(
    event: esp_idf_svc::sys::esp_gatts_cb_event_t,
    gatts_if: esp_idf_svc::sys::esp_gatt_if_t,
    param: *mut esp_idf_svc::sys::esp_ble_gatts_cb_param_t,
) {
    use esp_idf_svc::sys::*;

    BLE_GATTS_IF.store(gatts_if as u32, AtomicOrdering::Relaxed);

    match event {
        esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
            log::info!("BLE GATTS: app registered (if={})", gatts_if);
            let svc_uuid = uuid128_to_esp(SERVICE_UUID);
            let mut svc_id = esp_gatt_srvc_id_t {
                id: esp_gatt_id_t {
                    uuid: svc_uuid,
                    inst_id: 0,
                },
                is_primary: true,
            };
            // service + 2 × (decl + value) + CCCD
            unsafe { esp_ble_gatts_create_service(gatts_if, &mut svc_id, 6) };
        }
        esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
            let p = unsafe { &(*param).create };
            let svc_handle = p.service_handle;
            BLE_SVC_HANDLE.store(svc_handle as u32, AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: service created (handle={})", svc_handle);
            unsafe { esp_ble_gatts_start_service(svc_handle) };
            BLE_CHAR_STEP.store(1, AtomicOrdering::Relaxed);
            unsafe {
                add_gatt_char(
                    svc_handle,
                    CHAR_COMMAND,
                    ESP_GATT_PERM_WRITE,
                    ESP_GATT_CHAR_PROP_BIT_WRITE,
                );
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
            let p = unsafe { &(*param).add_char };
            let handle = p.attr_handle;
            let svc_handle = BLE_SVC_HANDLE.load(AtomicOrdering::Relaxed) as u16;
            match BLE_CHAR_STEP.load(AtomicOrdering::Relaxed) {
                1 => {
                    BLE_COMMAND_HANDLE.store(handle as u32, AtomicOrdering::Relaxed);
                    log::info!("BLE GATTS: command char (handle={})", handle);
                    BLE_CHAR_STEP.store(2, AtomicOrdering::Relaxed);
                    unsafe {
                        add_gatt_char(
                            svc_handle,
                            CHAR_DATA_EVENT,
                            ESP_GATT_PERM_READ,
                            ESP_GATT_CHAR_PROP_BIT_NOTIFY,
                        );
                    }
                }
                2 => {
                    BLE_DATA_HANDLE.store(handle as u32, AtomicOrdering::Relaxed);
                    log::info!("BLE GATTS: data/event char (handle={})", handle);
                    BLE_CHAR_STEP.store(3, AtomicOrdering::Relaxed);
                    let mut cccd: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
                    cccd.len = 2;
                    cccd.uuid.uuid16 = ESP_GATT_UUID_CHAR_CLIENT_CONFIG as u16;
                    unsafe {
                        esp_ble_gatts_add_char_descr(
                            svc_handle,
                            &mut cccd,
                            (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
                            core::ptr::null_mut(),
                            core::ptr::null_mut(),
                        );
                    }
                }
                _ => {}
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_DESCR_EVT => {
            log::info!("BLE GATTS: service ready");
        }
        esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
            let p = unsafe { &(*param).connect };
            BLE_CONN_ID.store(p.conn_id as u32, AtomicOrdering::Relaxed);
            BLE_MTU.store(DEFAULT_MTU as u32, AtomicOrdering::Relaxed);
            BLE_CONNECTED.store(true, AtomicOrdering::Release);
            log::info!("BLE GATTS: client connected (conn_id={})", p.conn_id);
            post(LinkEvent::Connected { mtu: DEFAULT_MTU });
        }
        esp_gatts_cb_event_t_ESP_GATTS_MTU_EVT => {
            let mtu = unsafe { (*param).mtu.mtu };
            BLE_MTU.store(mtu as u32, AtomicOrdering::Relaxed);
            post(LinkEvent::MtuChanged { mtu });
        }
        esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
            BLE_CONNECTED.store(false, AtomicOrdering::Release);
            log::info!("BLE GATTS: client disconnected");
            post(LinkEvent::Disconnected);
            unsafe { start_advertising() };
        }
        esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
            let p = unsafe { &(*param).write };
            if p.handle as u32 == BLE_COMMAND_HANDLE.load(AtomicOrdering::Relaxed) {
                let data = unsafe { core::slice::from_raw_parts(p.value, p.len as usize) };
                post(LinkEvent::frame(data));
            }
            if p.need_rsp {
                unsafe {
                    esp_ble_gatts_send_response(
                        gatts_if,
                        p.conn_id,
                        p.trans_id,
                        esp_gatt_status_t_ESP_GATT_OK,
                        core::ptr::null_mut(),
                    );
                }
            }
        }
        _ => {}
    }
}

// ───────────────────────────────────────────────────────────────
// BLE adapter
// ───────────────────────────────────────────────────────────────

pub struct BleLink {
    state: BleState,
    device_name: heapless::String<24>,
    /// Simulation: negotiated MTU of the fake peer.
    #[cfg(not(feature = "espidf"))]
    sim_mtu: u16,
    /// Simulation: every notification sent, oldest first.
    #[cfg(not(feature = "espidf"))]
    sim_sent: Vec<Vec<u8>>,
}

impl BleLink {
    pub fn new(device_name: &str) -> Self {
        let mut name = heapless::String::new();
        for c in device_name.chars() {
            if name.push(c).is_err() {
                break;
            }
        }
        Self {
            state: BleState::Idle,
            device_name: name,
            #[cfg(not(feature = "espidf"))]
            sim_mtu: DEFAULT_MTU,
            #[cfg(not(feature = "espidf"))]
            sim_sent: Vec::new(),
        }
    }

    pub fn state(&self) -> BleState {
        self.state
    }

    /// Bring up the stack and start advertising.
    pub fn start(&mut self) {
        info!("BLE: starting advertising as '{}'", self.device_name);
        self.platform_start();
        if self.state != BleState::Failed {
            self.state = BleState::Advertising;
        }
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(feature = "espidf")]
    fn platform_start(&mut self) {
        use esp_idf_svc::sys::*;
        use log::error;
        unsafe {
            // Release classic BT memory (BLE-only mode saves ~30 KB).
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            let ret = esp_bt_controller_init(&mut bt_cfg);
            if ret != ESP_OK as i32 {
                error!("BLE: bt_controller_init failed ({})", ret);
                self.state = BleState::Failed;
                return;
            }

            let ret = esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE);
            if ret != ESP_OK as i32 {
                error!("BLE: bt_controller_enable failed ({})", ret);
                self.state = BleState::Failed;
                return;
            }

            let ret = esp_bluedroid_init();
            if ret != ESP_OK as i32 {
                error!("BLE: bluedroid_init failed ({})", ret);
                self.state = BleState::Failed;
                return;
            }

            let ret = esp_bluedroid_enable();
            if ret != ESP_OK as i32 {
                error!("BLE: bluedroid_enable failed ({})", ret);
                self.state = BleState::Failed;
                return;
            }

            esp_ble_gap_register_callback(Some(ble_gap_event_handler));
            esp_ble_gatts_register_callback(Some(ble_gatts_event_handler));
            esp_ble_gatts_app_register(0);
            // Allow the largest notification a historic frame can need.
            esp_ble_gatt_set_local_mtu(517);

            let mut name = [0u8; 25];
            let bytes = self.device_name.as_bytes();
            name[..bytes.len()].copy_from_slice(bytes);
            esp_ble_gap_set_device_name(name.as_ptr() as *const _);

            start_advertising();

            info!(
                "BLE(espidf): Bluedroid stack initialized, advertising as '{}'",
                self.device_name
            );
        }
    }

    #[cfg(not(feature = "espidf"))]
    fn platform_start(&mut self) {
        info!(
            "BLE(sim): advertising '{}' (service {:032x})",
            self.device_name, SERVICE_UUID
        );
    }

    // ── Simulation peer ───────────────────────────────────────

    /// Simulation: a central connects with the given MTU.
    #[cfg(not(feature = "espidf"))]
    pub fn sim_connect(&mut self, mtu: u16) -> LinkEvent {
        self.state = BleState::Connected;
        self.sim_mtu = mtu;
        LinkEvent::Connected { mtu }
    }

    /// Simulation: the central disconnects.
    #[cfg(not(feature = "espidf"))]
    pub fn sim_disconnect(&mut self) -> LinkEvent {
        self.state = BleState::Advertising;
        self.sim_mtu = DEFAULT_MTU;
        LinkEvent::Disconnected
    }

    /// Simulation: the central writes the command characteristic.
    #[cfg(not(feature = "espidf"))]
    pub fn sim_write(&self, data: &[u8]) -> LinkEvent {
        LinkEvent::frame(data)
    }

    /// Simulation: take every notification sent so far.
    #[cfg(not(feature = "espidf"))]
    pub fn sim_take_sent(&mut self) -> Vec<Vec<u8>> {
        core::mem::take(&mut self.sim_sent)
    }

    /// Simulation: hand an event to the shared channel, like a callback would.
    #[cfg(not(feature = "espidf"))]
    pub fn sim_post(&self, event: LinkEvent) {
        post(event);
    }
}

// ───────────────────────────────────────────────────────────────
// Link implementation
// ───────────────────────────────────────────────────────────────

impl Link for BleLink {
    #[cfg(feature = "espidf")]
    fn is_connected(&self) -> bool {
        BLE_CONNECTED.load(AtomicOrdering::Acquire)
    }

    #[cfg(not(feature = "espidf"))]
    fn is_connected(&self) -> bool {
        self.state == BleState::Connected
    }

    #[cfg(feature = "espidf")]
    fn mtu(&self) -> usize {
        BLE_MTU.load(AtomicOrdering::Relaxed) as usize
    }

    #[cfg(not(feature = "espidf"))]
    fn mtu(&self) -> usize {
        usize::from(self.sim_mtu)
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        if frame.len() > self.max_payload() {
            warn!(
                "BLE: frame of {} bytes exceeds payload {}",
                frame.len(),
                self.max_payload()
            );
            return Err(LinkError::MtuExceeded);
        }
        self.platform_send(frame)
    }
}

impl BleLink {
    #[cfg(feature = "espidf")]
    fn platform_send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        use esp_idf_svc::sys::*;
        let handle = BLE_DATA_HANDLE.load(AtomicOrdering::Relaxed);
        if handle == 0 {
            return Err(LinkError::Io);
        }
        let ret = unsafe {
            esp_ble_gatts_send_indicate(
                BLE_GATTS_IF.load(AtomicOrdering::Relaxed) as esp_gatt_if_t,
                BLE_CONN_ID.load(AtomicOrdering::Relaxed) as u16,
                handle as u16,
                frame.len() as u16,
                frame.as_ptr() as *mut u8,
                false,
            )
        };
        if ret != ESP_OK as i32 {
            return Err(LinkError::Io);
        }
        Ok(())
    }

    #[cfg(not(feature = "espidf"))]
    fn platform_send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        self.sim_sent.push(frame.to_vec());
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

use cm160_lib::constants::{ENDPOINT_IN, ENDPOINT_OUT, PID, VID};
use nusb::list_devices;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    info!("Searching for OWL CM160 (VID: {:#06x}, PID: {:#06x})...", VID, PID);

    let devices = match list_devices().await {
        Ok(devices) => devices,
        Err(e) => {
            error!("Error listing USB devices: {:?}", e);
            return;
        }
    };

    let Some(device_info) = devices
        .into_iter()
        .find(|d| d.vendor_id() == VID && d.product_id() == PID)
    else {
        warn!("OWL CM160 not found.");
        return;
    };

    info!("OWL CM160 Found!");
    info!(
        "  VID: {:#06x}, PID: {:#06x}, Bus: {}, Address: {:03}",
        device_info.vendor_id(),
        device_info.product_id(),
        device_info.bus_id(),
        device_info.device_address()
    );
    if let Some(manufacturer) = device_info.manufacturer_string() {
        info!("  Manufacturer: {}", manufacturer);
    }
    if let Some(product) = device_info.product_string() {
        info!("  Product: {}", product);
    }
    if let Some(serial) = device_info.serial_number() {
        info!("  Serial: {}", serial);
    }
    info!("  Speed: {:?}", device_info.speed());

    let device = match device_info.open().await {
        Ok(device) => device,
        Err(e) => {
            error!(
                "Failed to open CM160: {:?}. Check permissions (udev rules on Linux).",
                e
            );
            return;
        }
    };

    let config = match device.active_configuration() {
        Ok(config) => config,
        Err(e) => {
            error!("  Failed to get active configuration: {:?}", e);
            return;
        }
    };
    info!("  Active configuration: {}", config.configuration_value());

    let mut found_in = false;
    let mut found_out = false;
    for group in config.interfaces() {
        for setting in group.alt_settings() {
            info!(
                "    Interface {} alt {}: class {:#04x} subclass {:#04x} protocol {:#04x}",
                setting.interface_number(),
                setting.alternate_setting(),
                setting.class(),
                setting.subclass(),
                setting.protocol()
            );
            for endpoint in setting.endpoints() {
                let address = endpoint.address();
                found_in |= address == ENDPOINT_IN;
                found_out |= address == ENDPOINT_OUT;
                info!(
                    "      Endpoint {:#04x} ({}): {:?}, max packet {}",
                    address,
                    if address & 0x80 != 0 { "IN" } else { "OUT" },
                    endpoint.transfer_type(),
                    endpoint.max_packet_size()
                );
            }
        }
    }

    if found_in && found_out {
        info!("Bulk endpoints {:#04x}/{:#04x} present, device looks usable.", ENDPOINT_IN, ENDPOINT_OUT);
    } else {
        warn!(
            "Expected bulk endpoints {:#04x} (IN) and {:#04x} (OUT) were not all found.",
            ENDPOINT_IN, ENDPOINT_OUT
        );
    }
}

use crate::constants::{
    ACK_TIMEOUT, BAUD_RATE, CONFIGURATION, CONTROL_TIMEOUT, CP210X_IFC_ENABLE, CP210X_SET_BAUDRATE, ENDPOINT_IN,
    ENDPOINT_OUT, INTERFACE, PID, READ_BUFFER_SIZE, UART_DISABLE, UART_ENABLE, VID,
};
use crate::error::CmError;
use crate::transport::Transport;
use bytes::Bytes;
use nusb::transfer::{Buffer, Bulk, ControlOut, ControlType, In, Out, Recipient};
use nusb::{Device, Endpoint, Interface};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Connection to an OWL CM160 through its CP210x USB-UART bridge.
pub struct Cm160 {
    device: Device,
    interface: Interface,
    ep_in: Endpoint<Bulk, In>,
    ep_out: Endpoint<Bulk, Out>,
}

impl Cm160 {
    /// Finds the first CM160 on the bus, claims it and configures the UART
    pub async fn open() -> Result<Self, CmError> {
        info!("Searching for OWL CM160...");
        let device_info = nusb::list_devices()
            .await?
            .find(|d| d.vendor_id() == VID && d.product_id() == PID)
            .ok_or(CmError::DeviceNotFound)?;
        info!("Found device: {:?}", device_info);

        let device = device_info.open().await?;
        if let Err(e) = device.set_configuration(CONFIGURATION).await {
            warn!("Could not set configuration {}: {}", CONFIGURATION, e);
        }

        let interface = device.detach_and_claim_interface(INTERFACE).await?;
        info!("Interface claimed successfully.");

        Self::configure_uart(&interface).await?;

        let ep_in = interface
            .endpoint::<Bulk, In>(ENDPOINT_IN)
            .map_err(|e| CmError::Transport(format!("Could not open endpoint {:#04x}: {}", ENDPOINT_IN, e)))?;
        let ep_out = interface
            .endpoint::<Bulk, Out>(ENDPOINT_OUT)
            .map_err(|e| CmError::Transport(format!("Could not open endpoint {:#04x}: {}", ENDPOINT_OUT, e)))?;

        Ok(Self {
            device,
            interface,
            ep_in,
            ep_out,
        })
    }

    /// Sets the bridge to the baud rate the meter talks at
    async fn configure_uart(interface: &Interface) -> Result<(), CmError> {
        let baud = BAUD_RATE.to_le_bytes();
        let requests: [(u8, u16, &[u8]); 3] = [
            (CP210X_IFC_ENABLE, UART_ENABLE, &[]),
            (CP210X_SET_BAUDRATE, 0, &baud),
            (CP210X_IFC_ENABLE, UART_DISABLE, &[]),
        ];

        for (request, value, data) in requests {
            interface
                .control_out(
                    ControlOut {
                        control_type: ControlType::Vendor,
                        recipient: Recipient::Interface,
                        request,
                        value,
                        index: u16::from(INTERFACE),
                        data,
                    },
                    CONTROL_TIMEOUT,
                )
                .await?;
        }
        debug!(baud = BAUD_RATE, "UART configured");
        Ok(())
    }

    /// Releases the interface and resets the device
    pub async fn close(self) {
        info!("Closing connection with the device");
        let Self {
            device, interface, ..
        } = self;
        drop(interface);
        if let Err(e) = device.reset().await {
            warn!("Could not reset device: {}", e);
        }
    }
}

impl Transport for Cm160 {
    async fn read(&mut self) -> Result<Bytes, CmError> {
        // A cancelled read leaves its transfer pending; reuse it.
        if self.ep_in.pending() == 0 {
            let buffer = self.ep_in.allocate(READ_BUFFER_SIZE);
            self.ep_in.submit(buffer);
        }
        let completion = self.ep_in.next_complete().await;
        completion.status?;
        let data = Bytes::copy_from_slice(&completion.buffer[..completion.actual_len]);
        debug!(bytes = hex::encode(&data), "USB Read");
        Ok(data)
    }

    async fn write_ack(&mut self, ack: u8) -> Result<(), CmError> {
        self.ep_out.submit(Buffer::from(vec![ack]));
        let completion = timeout(ACK_TIMEOUT, self.ep_out.next_complete()).await?;
        completion.status?;
        debug!("Wrote ack {:#04x}", ack);
        Ok(())
    }
}

mod device;
mod dpc;
mod gms;
mod runtime;
mod signature;

use permtest::eyre;

/// Every permission the sample modules touch.
#[cfg(test)]
pub const SAMPLE_PERMISSIONS: &[&str] = &[
    "CAMERA",
    "READ_CONTACTS",
    "RECORD_AUDIO",
    "POST_NOTIFICATIONS",
    "WRITE_EXTERNAL_STORAGE",
    "ACCESS_FINE_LOCATION",
    "REBOOT",
    "INSTALL_PACKAGES",
    "READ_LOGS",
    "MANAGE_DEVICE_POLICY_CAMERA",
    "MANAGE_DEVICE_ADMINS",
    "BIND_DEVICE_ADMIN",
    gms::READ_GSERVICES,
];

#[permtest::main]
#[tokio::main]
async fn main() -> eyre::Result<()> {
    let catalog = run();
    let mut app = permtest::App::new();
    app.set_platform(device::platform());
    app.run(catalog).await?;
    Ok(())
}

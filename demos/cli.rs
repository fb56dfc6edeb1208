use anyhow::Result;
use qnap_stats::client::QnapStatsBuilder;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let qnap = QnapStatsBuilder::from_env()?
        .debug(true)
        .verify_ssl(false)
        .build()?;

    match qnap.get_system_stats().await? {
        Some(stats) => {
            println!(
                "{} ({}), firmware {} build {}, up {} h",
                stats.system.name,
                stats.system.model,
                stats.firmware.version,
                stats.firmware.build,
                stats.uptime.total().num_hours()
            );
            for (name, nic) in &stats.nics {
                println!("{name}: {:?} {} ({})", nic.link_status, nic.ip, nic.mac);
            }
        }
        None => println!("system stats: not supported"),
    }

    println!("health: {:?}", qnap.get_system_health().await?);

    if let Some(disks) = qnap.get_smart_disk_health().await? {
        for disk in disks.values() {
            println!(
                "disk {}: {} {} {:?}, temp {:?} C",
                disk.drive_number, disk.model, disk.health, disk.disk_type, disk.temp_c
            );
        }
    }

    if let Some(volumes) = qnap.get_volumes().await? {
        for volume in volumes.values() {
            println!(
                "volume {}: {} free of {} ({}% used)",
                volume.label,
                volume.calculate_free(),
                volume.calculate_total(),
                volume.used_percent()
            );
            for folder in &volume.folders {
                println!("  {}: {}", folder.sharename, folder.calculate_used());
            }
        }
    }

    if let Some(bandwidth) = qnap.get_bandwidth().await? {
        for (id, interface) in bandwidth {
            println!(
                "{id} ({}): rx {} B/s, tx {} B/s{}",
                interface.name,
                interface.rx,
                interface.tx,
                if interface.is_default { ", default" } else { "" }
            );
        }
    }

    println!("firmware update: {:?}", qnap.get_firmware_update().await?);
    println!("external drives: {:?}", qnap.list_external_drives().await?);

    Ok(())
}

use std::sync::Arc;
use std::time::SystemTime;

use media_fs::cache::{BlockCache, LinkResolver};
use media_fs::fs::fuser::{FuserAdapter, MountIdentity};
use media_fs::fs::vfs::Vfs;
use media_fs::namespace::{NamespaceSnapshot, PublishedNamespace};
use media_fs::refresh::Refresher;
use tokio::select;
use tracing::{debug, error, info};

use crate::app_config;
use crate::provider::TorboxProvider;

mod managed_fuse {
    //! fuser only does a regular unmount when the `BackgroundSession` is dropped. We want to be
    //! aggressive and force an unmount if possible, so [`ManagedFuse`] retries a detaching
    //! unmount on drop.
    use std::path::PathBuf;
    use std::time::Duration;

    use fuser::BackgroundSession;
    use media_fs::fs::fuser::FuserAdapter;
    use media_fs::remote::RemoteContent;
    use nix::errno::Errno;

    use super::{app_config, debug, error};

    pub struct ManagedFuse {
        mount_point: PathBuf,
    }

    impl ManagedFuse {
        pub fn new(config: &app_config::Config) -> Self {
            Self {
                mount_point: config.mount_point.clone(),
            }
        }

        pub fn spawn<C: RemoteContent>(
            &self,
            adapter: FuserAdapter<C>,
        ) -> Result<BackgroundSession, std::io::Error> {
            let mount_opts = [
                fuser::MountOption::FSName("media-fs".to_owned()),
                fuser::MountOption::RO,
                fuser::MountOption::NoDev,
                fuser::MountOption::NoSuid,
                fuser::MountOption::AutoUnmount,
                fuser::MountOption::DefaultPermissions,
                fuser::MountOption::AllowOther,
            ];

            fuser::spawn_mount2(adapter, &self.mount_point, &mount_opts)
        }
    }

    impl Drop for ManagedFuse {
        fn drop(&mut self) {
            const UMOUNT_ATTEMPT_COUNT: usize = 10;
            const UMOUNT_ATTEMPT_DELAY: Duration = Duration::from_millis(10);

            debug!(mount_point = ?self.mount_point, "Confirming unmount of FUSE filesystem...");

            for i in 0..UMOUNT_ATTEMPT_COUNT {
                let result = {
                    #[cfg(target_os = "macos")]
                    {
                        nix::mount::unmount(&self.mount_point, nix::mount::MntFlags::MNT_FORCE)
                    }

                    #[cfg(target_os = "linux")]
                    {
                        nix::mount::umount2(&self.mount_point, nix::mount::MntFlags::MNT_DETACH)
                    }
                };

                match result {
                    Ok(()) => {
                        debug!(attempt = i + 1, "Unmounted FUSE filesystem.");
                        break;
                    }
                    Err(Errno::EBUSY) => {
                        debug!(attempt = i + 1, "FUSE filesystem still busy, retrying...");
                        std::thread::sleep(UMOUNT_ATTEMPT_DELAY);
                    }
                    Err(Errno::EINVAL | Errno::ENOENT) => {
                        debug!(attempt = i + 1, "FUSE filesystem already unmounted.");
                        break;
                    }
                    Err(e) => {
                        error!(attempt = i + 1, error = %e, "Failed to unmount FUSE filesystem.");
                        break;
                    }
                }
            }
        }
    }
}

/// Prepares the mount point directory.
///
/// - If the directory exists and is non-empty, returns an error.
/// - If the directory does not exist, creates it (including parents) and logs an info message.
/// - If the directory exists and is empty, does nothing.
async fn prepare_mount_point(mount_point: &std::path::Path) -> Result<(), std::io::Error> {
    match tokio::fs::read_dir(mount_point).await {
        Ok(mut entries) => {
            if entries.next_entry().await?.is_some() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!(
                        "Mount point '{}' already exists and is not empty.",
                        mount_point.display()
                    ),
                ));
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tokio::fs::create_dir_all(mount_point).await?;
            info!(path = %mount_point.display(), "Created mount point directory.");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn wait_for_exit() -> Result<(), std::io::Error> {
    use tokio::signal;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let mut sighup = signal::unix::signal(signal::unix::SignalKind::hangup())?;
    select! {
        _ = signal::ctrl_c() => {
            debug!("Received Ctrl+C signal, shutting down...");
        },
        _ = sigterm.recv() => {
            debug!("Received termination signal, shutting down...");
        },
        _ = sighup.recv() => {
            debug!("Received hangup signal, shutting down...");
        },
    }
    Ok(())
}

/// Main entry point for the daemon.
pub async fn run(
    config: app_config::Config,
    handle: tokio::runtime::Handle,
) -> Result<(), std::io::Error> {
    let provider = TorboxProvider::from_config(&config.remote)
        .map(Arc::new)
        .map_err(std::io::Error::other)?;

    let namespace = Arc::new(PublishedNamespace::new(NamespaceSnapshot::empty(
        config.namespace_mode,
    )));
    let links = Arc::new(LinkResolver::new(
        Arc::clone(&provider),
        config.cache.link_ttl(),
    ));
    let blocks = Arc::new(BlockCache::new(
        Arc::clone(&provider),
        links,
        config.cache.block_cache(),
    ));
    let vfs = Arc::new(Vfs::new(Arc::clone(&namespace), blocks));

    let refresher = Refresher::new(
        Arc::clone(&provider),
        namespace,
        config.namespace_mode,
        config.refresh_interval(),
    );
    // The first listing runs before mounting so the tree is populated when it appears.
    let outcome = refresher.refresh_once().await;
    debug!(?outcome, "Initial namespace refresh finished.");

    prepare_mount_point(&config.mount_point).await?;

    info!("Mounting filesystem at {}.", config.mount_point.display());

    let identity = MountIdentity {
        uid: config.uid,
        gid: config.gid,
        mounted_at: SystemTime::now(),
    };
    let fuse = managed_fuse::ManagedFuse::new(&config);
    {
        let _session = fuse.spawn(FuserAdapter::new(vfs, identity, handle))?;
        let refresh_task = refresher.spawn();
        info!("media-fs is running. Press Ctrl+C to stop.");

        let exit = wait_for_exit().await;
        refresh_task.abort();
        exit?;
    }
    Ok(())
}

pub fn spawn(config: app_config::Config) -> Result<(), std::io::Error> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(config, runtime.handle().clone()))
}

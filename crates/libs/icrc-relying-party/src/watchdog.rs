use std::sync::Weak;

use icrc_rpc::{IcrcMethod, ICRC29_STATUS_READY};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::WatchdogOptions;
use crate::request::{Attention, Connection, RequestOptions};

/// Probes the signer with `icrc29_status` on a fixed interval. The first
/// probe that is not answered `ready` in time marks the connection
/// disconnected and ends the task. Requests already in flight are left to
/// their own deadlines.
pub(crate) fn spawn(connection: Weak<Connection>, options: WatchdogOptions) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(connection) = connection.upgrade() else {
                break;
            };
            if !connection.is_connected() {
                break;
            }
            let probe = connection
                .request(
                    IcrcMethod::Status,
                    None,
                    Attention::Quiet,
                    &RequestOptions::default(),
                    options.timeout,
                    |result| (result.as_str() == Some(ICRC29_STATUS_READY)).then_some(()),
                )
                .await;
            match probe {
                Ok(()) => log::trace!("rp(watchdog): signer at {} is ready", connection.origin()),
                Err(err) => {
                    log::warn!("rp(watchdog): signer at {} is gone: {err}", connection.origin());
                    connection.mark_disconnected();
                    break;
                }
            }
        }
    })
}

//! Watcher running on its own task, fed by a host notification channel

use autocall_call_ui_watcher::{
    CallUiWatcher, UiAutomation, UiNode, WatcherConfig, WindowStateEvent, DEFAULT_CALL_UI_PACKAGE,
    DEFAULT_END_CALL_ID,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Call screen whose end-call button appears only after the first render
#[derive(Default)]
struct FakeCallScreen {
    renders: Mutex<u32>,
    clicked: Mutex<Vec<u64>>,
}

impl UiAutomation for FakeCallScreen {
    fn find_by_view_id(&self, view_id: &str) -> Vec<UiNode> {
        let mut renders = self.renders.lock();
        *renders += 1;
        if *renders == 1 || view_id != DEFAULT_END_CALL_ID {
            return Vec::new();
        }
        vec![UiNode::new(u64::from(*renders), view_id, true)]
    }

    fn click(&self, node: &UiNode) -> bool {
        self.clicked.lock().push(node.node_id);
        true
    }
}

#[tokio::test]
async fn test_spawned_watcher_handles_stream() {
    let screen = Arc::new(FakeCallScreen::default());
    let watcher = CallUiWatcher::builder(WatcherConfig::default(), screen.clone())
        .build()
        .unwrap();
    watcher.on_service_connected();

    let (tx, rx) = mpsc::channel(8);
    let task = watcher.spawn(rx);

    tx.send(WindowStateEvent::window_state(DEFAULT_CALL_UI_PACKAGE)).await.unwrap();
    tx.send(WindowStateEvent::window_state("com.example.launcher")).await.unwrap();
    tx.send(WindowStateEvent::window_state(DEFAULT_CALL_UI_PACKAGE)).await.unwrap();
    drop(tx);
    task.await.unwrap();

    // First detection found nothing and was not retried; the second clicked.
    let stats = watcher.stats();
    assert_eq!(stats.detections, 2);
    assert_eq!(stats.control_missing, 1);
    assert_eq!(stats.terminations, 1);
    assert_eq!(*screen.clicked.lock(), vec![2]);
}

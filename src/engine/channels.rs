//! Backend Channels
//!
//! Lock-free communication between the control thread and the render side.
//! Uses rtrb ring buffers for SPSC (single-producer, single-consumer) queues.

use rtrb::{Consumer, Producer, RingBuffer};

use super::commands::{BackendCommand, RenderEvent};

/// Default buffer size for command queue (control -> render).
pub const DEFAULT_COMMAND_BUFFER_SIZE: usize = 1024;

/// Default buffer size for event queue (render -> control).
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

/// Holds both directions of communication channels.
/// Split into producer/consumer pairs for the two threads.
pub struct BackendChannels {
    command_tx: Producer<BackendCommand>,
    command_rx: Consumer<BackendCommand>,
    event_tx: Producer<RenderEvent>,
    event_rx: Consumer<RenderEvent>,
}

impl BackendChannels {
    /// Create new channels with the specified buffer sizes.
    pub fn new(command_capacity: usize, event_capacity: usize) -> Self {
        let (command_tx, command_rx) = RingBuffer::new(command_capacity);
        let (event_tx, event_rx) = RingBuffer::new(event_capacity);

        Self {
            command_tx,
            command_rx,
            event_tx,
            event_rx,
        }
    }

    /// Create new channels with default buffer sizes.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_COMMAND_BUFFER_SIZE, DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Split the channels into control-side and render-side handles.
    pub fn split(self) -> (ControlHandle, RenderEndpoint) {
        let control = ControlHandle {
            command_tx: self.command_tx,
            event_rx: self.event_rx,
        };
        let render = RenderEndpoint {
            command_rx: self.command_rx,
            event_tx: self.event_tx,
        };
        (control, render)
    }
}

/// Control-side handle: command producer and event consumer.
pub struct ControlHandle {
    command_tx: Producer<BackendCommand>,
    event_rx: Consumer<RenderEvent>,
}

impl ControlHandle {
    /// Send a command to the render side.
    /// Returns Err(cmd) if the buffer is full. Never waits for space.
    pub fn send_command(&mut self, cmd: BackendCommand) -> Result<(), BackendCommand> {
        self.command_tx
            .push(cmd)
            .map_err(|rtrb::PushError::Full(cmd)| cmd)
    }

    /// Receive an event from the render side, if one is pending.
    pub fn recv_event(&mut self) -> Option<RenderEvent> {
        self.event_rx.pop().ok()
    }

    /// Drain all pending events.
    pub fn drain_events(&mut self) -> impl Iterator<Item = RenderEvent> + '_ {
        std::iter::from_fn(|| self.recv_event())
    }

    /// Check how many commands can still be queued.
    pub fn command_slots_available(&self) -> usize {
        self.command_tx.slots()
    }

    /// Check if the command buffer is full.
    pub fn is_command_buffer_full(&self) -> bool {
        self.command_tx.is_full()
    }
}

/// Render-side handle: command consumer and event producer.
///
/// All methods are real-time safe (non-blocking, no allocations).
pub struct RenderEndpoint {
    command_rx: Consumer<BackendCommand>,
    event_tx: Producer<RenderEvent>,
}

impl RenderEndpoint {
    /// Receive a command, if one is pending.
    pub fn recv_command(&mut self) -> Option<BackendCommand> {
        self.command_rx.pop().ok()
    }

    /// Process all pending commands in order with the given handler.
    pub fn process_commands<F>(&mut self, mut handler: F)
    where
        F: FnMut(BackendCommand),
    {
        while let Some(cmd) = self.recv_command() {
            handler(cmd);
        }
    }

    /// Send an event, or get it back if the buffer is full.
    pub fn send_event(&mut self, event: RenderEvent) -> Result<(), RenderEvent> {
        self.event_tx
            .push(event)
            .map_err(|rtrb::PushError::Full(event)| event)
    }

    /// Send an event, dropping it if the buffer is full.
    pub fn send_event_lossy(&mut self, event: RenderEvent) {
        let _ = self.event_tx.push(event);
    }

    /// Check how many commands are pending.
    pub fn commands_pending(&self) -> usize {
        self.command_rx.slots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::{UnitHandle, UnitKind, Wire};

    #[test]
    fn test_command_send_receive() {
        let (mut control, mut render) = BackendChannels::new(8, 8).split();
        assert!(control.send_command(BackendCommand::SetRunning(true)).is_ok());
        assert!(matches!(
            render.recv_command(),
            Some(BackendCommand::SetRunning(true))
        ));
        assert!(render.recv_command().is_none());
    }

    #[test]
    fn test_event_send_receive() {
        let (mut control, mut render) = BackendChannels::new(8, 8).split();
        render.send_event_lossy(RenderEvent::Started);
        render.send_event_lossy(RenderEvent::UnknownUnit(UnitHandle(4)));

        let events: Vec<_> = control.drain_events().collect();
        assert_eq!(
            events,
            vec![RenderEvent::Started, RenderEvent::UnknownUnit(UnitHandle(4))]
        );
    }

    #[test]
    fn test_buffer_full_handling() {
        let (mut control, render) = BackendChannels::new(2, 2).split();
        assert!(control.send_command(BackendCommand::SetRunning(true)).is_ok());
        assert!(control
            .send_command(BackendCommand::DestroyUnit { unit: UnitHandle(1) })
            .is_ok());
        assert!(control.is_command_buffer_full());
        assert_eq!(render.commands_pending(), 2);

        let result = control.send_command(BackendCommand::Close);
        assert!(matches!(result, Err(BackendCommand::Close)));
    }

    #[test]
    fn test_process_commands_in_order() {
        let (mut control, mut render) = BackendChannels::with_defaults().split();
        let wire = Wire::to_input(UnitHandle(1), 0, UnitHandle(0), 0);
        control
            .send_command(BackendCommand::CreateUnit {
                unit: UnitHandle(1),
                kind: UnitKind::Gain,
            })
            .unwrap();
        control.send_command(BackendCommand::Connect(wire)).unwrap();
        assert_eq!(control.command_slots_available(), DEFAULT_COMMAND_BUFFER_SIZE - 2);

        let mut commands = Vec::new();
        render.process_commands(|cmd| commands.push(cmd));
        assert_eq!(commands.len(), 2);
        assert!(matches!(commands[0], BackendCommand::CreateUnit { .. }));
        assert!(matches!(commands[1], BackendCommand::Connect(w) if w == wire));
    }

    #[test]
    fn test_handles_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ControlHandle>();
        assert_send::<RenderEndpoint>();
    }
}

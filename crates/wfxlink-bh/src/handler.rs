use wfxlink_frame::Message;

/// Upper layer receiving every decoded message.
///
/// Called from the bottom-half worker once per message, in arrival order.
/// Must not block for long: the chip stays awake until it returns.
pub trait MessageHandler: Send {
    fn dispatch(&mut self, message: Message);
}

impl<F> MessageHandler for F
where
    F: FnMut(Message) + Send,
{
    fn dispatch(&mut self, message: Message) {
        self(message)
    }
}

// Avatar Module - 形象模块
//
// - ports: 渲染端的窄触发接口
// - infrastructure: 无渲染端时的空适配器
// - driver: 把总线事件翻译成端口触发调用

pub mod driver;
pub mod infrastructure;
pub mod ports;

pub use driver::AvatarDriver;
pub use infrastructure::NullAvatarAdapter;
pub use ports::{AvatarPort, AvatarStatus};

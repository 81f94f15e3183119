//! Ports - 抽象化レイヤー
//!
//! # 構成
//! - **Component**: 各モジュールが実装するライフサイクル契約
//! - **Clock** / **IdGenerator**: 時刻と ID の供給源（テストで差し替え可能）

pub mod clock;
pub mod component;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::component::Component;
pub use self::id_generator::{IdGenerator, UlidGenerator};

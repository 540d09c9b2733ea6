pub mod noop;
pub mod system;

use anyhow::Result;

use crate::domain::models::OpenerBox;
use crate::domain::models::OpenerName;

pub struct OpenerManager {}

impl OpenerManager {
    pub fn get(name: OpenerName) -> Result<OpenerBox> {
        if name == OpenerName::System {
            return Ok(Box::<system::SystemOpener>::default());
        }

        return Ok(Box::<noop::NoopOpener>::default());
    }
}

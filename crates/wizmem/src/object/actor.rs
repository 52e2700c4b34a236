//! The actor body: position and orientation of an entity in the world.

use crate::error::Result;
use crate::hook::descriptor::HookName;
use crate::hook::registry::HookRegistry;
use crate::memory::process::ProcessAccess;
use crate::object::fields::{Field, XyzField};
use crate::object::view::{ObjectView, Xyz};

const POSITION: XyzField = XyzField::at(88);
const PITCH: Field<f32> = Field::at(100);
const ROLL: Field<f32> = Field::at(104);
const YAW: Field<f32> = Field::at(108);
const SCALE: Field<f32> = Field::at(112);
const HEIGHT: Field<f32> = Field::at(132);

/// An actor body at a known address.
pub struct ActorBody<'a, A: ProcessAccess> {
    view: ObjectView<'a, A>,
}

impl<'a, A: ProcessAccess + Sync> ActorBody<'a, A> {
    pub fn new(registry: &'a HookRegistry<'a, A>, address: u64) -> Result<Self> {
        Ok(Self {
            view: ObjectView::new_static(registry, address)?,
        })
    }

    /// The local player's body, resolved through the player hook.
    pub fn current(registry: &'a HookRegistry<'a, A>) -> Self {
        Self {
            view: ObjectView::singleton(registry, HookName::Player),
        }
    }

    pub fn view(&self) -> &ObjectView<'a, A> {
        &self.view
    }

    pub fn position(&self) -> Result<Xyz> {
        POSITION.read(&self.view)
    }

    pub fn write_position(&self, position: Xyz) -> Result<()> {
        POSITION.write(&self.view, position)
    }

    pub fn pitch(&self) -> Result<f32> {
        PITCH.read(&self.view)
    }

    pub fn write_pitch(&self, pitch: f32) -> Result<()> {
        PITCH.write(&self.view, pitch)
    }

    pub fn roll(&self) -> Result<f32> {
        ROLL.read(&self.view)
    }

    pub fn write_roll(&self, roll: f32) -> Result<()> {
        ROLL.write(&self.view, roll)
    }

    pub fn yaw(&self) -> Result<f32> {
        YAW.read(&self.view)
    }

    pub fn write_yaw(&self, yaw: f32) -> Result<()> {
        YAW.write(&self.view, yaw)
    }

    pub fn scale(&self) -> Result<f32> {
        SCALE.read(&self.view)
    }

    pub fn write_scale(&self, scale: f32) -> Result<()> {
        SCALE.write(&self.view, scale)
    }

    pub fn height(&self) -> Result<f32> {
        HEIGHT.read(&self.view)
    }

    pub fn write_height(&self, height: f32) -> Result<()> {
        HEIGHT.write(&self.view, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::hook::descriptor::CLIENT_MODULE;
    use crate::memory::mock::MockMemory;
    use crate::memory::read::MemoryExt;

    #[test]
    fn position_reads_three_floats_at_offset_88() {
        let mock = MockMemory::builder().region(0x2000, vec![0u8; 0x100]).build();
        let registry = HookRegistry::new(&mock);

        mock.write_vector::<f32>(0x2000 + 88, &[1.0, 2.0, 3.0]).unwrap();

        let body = ActorBody::new(&registry, 0x2000).unwrap();
        assert_eq!(body.position().unwrap(), Xyz::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn orientation_fields_roundtrip() {
        let mock = MockMemory::builder().region(0x2000, vec![0u8; 0x100]).build();
        let registry = HookRegistry::new(&mock);
        let body = ActorBody::new(&registry, 0x2000).unwrap();

        body.write_yaw(1.25).unwrap();
        body.write_scale(2.0).unwrap();
        body.write_height(180.5).unwrap();
        assert_eq!(body.yaw().unwrap(), 1.25);
        assert_eq!(body.scale().unwrap(), 2.0);
        assert_eq!(body.height().unwrap(), 180.5);
        // pitch/roll untouched.
        assert_eq!(body.pitch().unwrap(), 0.0);
        assert_eq!(body.roll().unwrap(), 0.0);
    }

    /// Full path: install the player hook against a synthetic client image,
    /// simulate the capture, then read the position through the singleton.
    #[test]
    fn current_body_resolves_through_player_hook() {
        let mut image = vec![0u8; 0x3000];

        // Player jump site: movsd xmm0,[rax+58] then two more movsd loads.
        let site = 0x200;
        image[site..site + 5].copy_from_slice(&[0xF2, 0x0F, 0x10, 0x40, 0x58]);
        image[site + 5..site + 10].copy_from_slice(&[0xF2, 0x0F, 0x10, 0x48, 0x60]);
        image[site + 10..site + 15].copy_from_slice(&[0xF2, 0x0F, 0x10, 0x50, 0x68]);

        // Autobot donor at +0x1000.
        let donor = 0x1000;
        let prologue: &[u8] = &[
            0x48, 0x8B, 0xC4, 0x55, 0x41, 0x54, 0x41, 0x55, 0x41, 0x56, 0x41, 0x57, 1, 2, 3, 4,
            5, 6, 7, //
            0x48, 1, 2, 3, 4, 5, 6, //
            0x48, 1, 2, 3, 4, 5, 6, 7, //
            0x48, 0x89, 0x58, 0x10, 0x48, 0x89, 0x70, 0x18, 0x48, 0x89, 0x78, 0x20, //
            1, 2, 3, 4, 5, 6, 7, //
            0x48, 0x33, 0xC4, //
            1, 2, 3, 4, 5, 6, 7, //
            0x4C, 0x8B, 0xE9, //
            1, 2, 3, 4, 5, 6, 7, //
            0x80,
        ];
        image[donor..donor + prologue.len()].copy_from_slice(prologue);

        let mock = MockMemory::builder()
            .module(CLIENT_MODULE, 0x1_4000_0000, image)
            .region(0x2000_0000, vec![0u8; 0x200])
            .build();
        let registry = HookRegistry::new(&mock);

        let body = ActorBody::current(&registry);
        assert!(matches!(body.position(), Err(Error::HookNotActive(_))));

        registry.activate(HookName::Player).unwrap();
        assert!(matches!(body.position(), Err(Error::HookNotReady(_))));

        // The hook's slot is its only live allocation; populate it the way
        // the patched code path would.
        let slot = mock.live_allocations()[0];
        mock.write_value::<u64>(slot, 0x2000_0000).unwrap();
        mock.write_vector::<f32>(0x2000_0000 + 88, &[1.0, 2.0, 3.0])
            .unwrap();

        assert_eq!(body.position().unwrap(), Xyz::new(1.0, 2.0, 3.0));
        assert_eq!(
            registry.wait_for_ready(HookName::Player, None).unwrap(),
            0x2000_0000
        );

        registry.close().unwrap();
    }
}

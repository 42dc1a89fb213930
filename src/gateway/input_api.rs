//! XInput / DirectInput presentation policy for GET_GAMEPAD

use std::collections::HashSet;

use crate::config::PreferredInputApi;

#[derive(Debug, Default)]
pub struct InputApiPolicy {
    preferred: PreferredInputApi,
    /// Guest processes that already asked through XInput
    xinput_processes: HashSet<i32>,
}

impl InputApiPolicy {
    pub fn new(preferred: PreferredInputApi) -> Self {
        Self {
            preferred,
            xinput_processes: HashSet::new(),
        }
    }

    pub fn set_preferred(&mut self, preferred: PreferredInputApi) {
        if self.preferred != preferred {
            self.preferred = preferred;
            self.xinput_processes.clear();
        }
    }

    /// Whether a GET_GAMEPAD request gets an enabled reply
    pub fn allows(&mut self, is_xinput: bool, process_id: i32) -> bool {
        match self.preferred {
            PreferredInputApi::Both => true,
            PreferredInputApi::Xinput => is_xinput,
            PreferredInputApi::Dinput => !is_xinput,
            PreferredInputApi::Auto => {
                if is_xinput {
                    self.xinput_processes.insert(process_id);
                    true
                } else {
                    !self.xinput_processes.contains(&process_id)
                }
            }
        }
    }

    pub fn release(&mut self) {
        self.xinput_processes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_preferences() {
        let mut both = InputApiPolicy::new(PreferredInputApi::Both);
        assert!(both.allows(true, 1));
        assert!(both.allows(false, 1));

        let mut xinput = InputApiPolicy::new(PreferredInputApi::Xinput);
        assert!(xinput.allows(true, 1));
        assert!(!xinput.allows(false, 1));

        let mut dinput = InputApiPolicy::new(PreferredInputApi::Dinput);
        assert!(!dinput.allows(true, 1));
        assert!(dinput.allows(false, 1));
    }

    #[test]
    fn test_auto_claims_per_process() {
        let mut policy = InputApiPolicy::new(PreferredInputApi::Auto);
        assert!(policy.allows(false, 100));
        assert!(policy.allows(true, 100));
        assert!(!policy.allows(false, 100));
        // Other processes are unaffected
        assert!(policy.allows(false, 200));

        policy.release();
        assert!(policy.allows(false, 100));
    }
}

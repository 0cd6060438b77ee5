use cfg_aliases::cfg_aliases;

fn main() {
    cfg_aliases! {
        // Bare-metal Cortex-M build, as opposed to a host build used for tests.
        arm_mcu: { all(target_arch = "arm", target_os = "none") },
    }
}

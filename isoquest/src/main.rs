use isoquest::prelude::*;

fn main() {
    let mut app = App::new();
    app.add_plugins(IsoquestPlugin);
    #[cfg(feature = "debug")]
    app.add_plugins(debug::DebugPlugin);
    app.run();
}

mod allocator;

use blockbench::app::App;

fn main() -> anyhow::Result<()> {
    App::init()?.execute()
}

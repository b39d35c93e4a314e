use crate::reports;
use clap::Args;
use lensgrid::error::RectifyResult;
use lensgrid::optics::OpticsRecipe;

#[derive(Args, Debug, Clone)]
pub struct OpticsArgs {
    #[command(flatten)]
    pub recipe: OpticsRecipe,
}

pub fn run(args: OpticsArgs) -> RectifyResult<()> {
    let slope = args.recipe.max_normalized_slope();
    reports::print_optics(&args.recipe, &slope);
    slope.map(|_| ())
}

mod dispatch_tests;
mod presence_tests;
mod supervisor_tests;

pub mod codecs;
